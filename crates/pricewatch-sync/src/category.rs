//! Category name derivation from listing URLs and find-or-create resolution.

use pricewatch_core::Category;
use pricewatch_storage::{CatalogStore, StoreError};
use tracing::info;
use url::Url;

use crate::RunError;

/// Second path segment of `source_url` with every `-` turned into a space.
///
/// `https://www.exito.com/mercado/lacteos-huevos` -> `lacteos huevos`.
pub fn derive_category_name(source_url: &str) -> Result<String, RunError> {
    let unresolvable = || RunError::CategoryResolution {
        url: source_url.to_string(),
    };
    let url = Url::parse(source_url).map_err(|_| unresolvable())?;
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.nth(1))
        .filter(|s| !s.is_empty())
        .ok_or_else(unresolvable)?;
    Ok(segment.replace('-', " "))
}

/// Exact-name lookup, creating the category when absent.
///
/// Not safe against concurrent creation of the same name; runs are serialized.
pub async fn find_or_create_category(
    store: &dyn CatalogStore,
    name: &str,
) -> Result<Category, StoreError> {
    if let Some(existing) = store.find_category_by_name(name).await? {
        return Ok(existing);
    }
    let created = store.create_category(name).await?;
    info!(category_id = %created.id, name, "category created");
    Ok(created)
}

pub async fn resolve_category(
    store: &dyn CatalogStore,
    source_url: &str,
) -> Result<Category, RunError> {
    let name = derive_category_name(source_url)?;
    find_or_create_category(store, &name)
        .await
        .map_err(RunError::Store)
}

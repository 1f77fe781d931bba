//! Read-side operations behind the catalog API.

use pricewatch_core::{Category, PageRequest, Product, ProductFilter, ProductPage};
use pricewatch_storage::{CatalogStore, StoreError};
use serde::Serialize;
use uuid::Uuid;

use crate::similarity::{rank, RankedProduct};

/// Maximum number of same-category products returned alongside a comparison.
pub const RELATED_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub base_product: Product,
    pub similar_products: Vec<RankedProduct>,
    pub related_products: Vec<Product>,
}

/// Returns `None` when `product_id` does not resolve.
pub async fn compare_product(
    store: &dyn CatalogStore,
    product_id: Uuid,
) -> Result<Option<Comparison>, StoreError> {
    let Some(base_product) = store.find_product_by_id(product_id).await? else {
        return Ok(None);
    };

    let candidates = store
        .find_all_products()
        .await?
        .into_iter()
        .filter(|p| p.id != base_product.id)
        .collect::<Vec<_>>();
    let similar_products = rank(&base_product, &candidates);

    let related_products = store
        .find_products_by_category(base_product.category_id, Some(base_product.id), RELATED_LIMIT)
        .await?;

    Ok(Some(Comparison {
        base_product,
        similar_products,
        related_products,
    }))
}

pub async fn list_products(
    store: &dyn CatalogStore,
    filter: &ProductFilter,
    page: PageRequest,
) -> Result<ProductPage, StoreError> {
    store.list_products(filter, page).await
}

pub async fn list_categories(store: &dyn CatalogStore) -> Result<Vec<Category>, StoreError> {
    store.list_categories().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::{Distributor, DistributorPrices, NormalizedRecord, NOT_AVAILABLE};
    use pricewatch_storage::MemoryStore;

    fn record(name: &str, category_id: Uuid) -> NormalizedRecord {
        NormalizedRecord {
            name: name.into(),
            image_url: NOT_AVAILABLE.into(),
            prices: DistributorPrices::only(Distributor::Exito, 3000),
            category_id,
        }
    }

    async fn find(store: &MemoryStore, name: &str) -> Product {
        store
            .find_all_products()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.name == name)
            .unwrap()
    }

    #[tokio::test]
    async fn comparison_separates_similar_from_related() {
        let store = MemoryStore::new();
        let lacteos = store.create_category("lacteos").await.unwrap();
        let deslactosados = store.create_category("deslactosados").await.unwrap();
        store
            .create_products(&[
                record("Leche Entera 1L", lacteos.id),
                record("Leche Deslactosada 1L", deslactosados.id),
                record("Queso Campesino", lacteos.id),
            ])
            .await
            .unwrap();
        let base = find(&store, "Leche Entera 1L").await;

        let cmp = compare_product(&store, base.id).await.unwrap().unwrap();
        assert_eq!(cmp.base_product, base);

        let similar = cmp
            .similar_products
            .iter()
            .map(|r| r.product.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(similar, vec!["Leche Deslactosada 1L"]);

        let related = cmp
            .related_products
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(related, vec!["Queso Campesino"]);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = MemoryStore::new();
        assert!(compare_product(&store, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn comparison_serializes_with_api_field_names() {
        let store = MemoryStore::new();
        let cat = store.create_category("lacteos").await.unwrap();
        store.create_products(&[record("Kumis", cat.id)]).await.unwrap();
        let base = find(&store, "Kumis").await;

        let cmp = compare_product(&store, base.id).await.unwrap().unwrap();
        let json = serde_json::to_value(&cmp).unwrap();
        assert_eq!(json["baseProduct"]["name"], "Kumis");
        assert_eq!(json["baseProduct"]["price_exito"], 3000);
        assert!(json["similarProducts"].as_array().unwrap().is_empty());
        assert!(json["relatedProducts"].as_array().unwrap().is_empty());
    }
}

use pricewatch_core::{NormalizedRecord, UpdateOp};
use pricewatch_storage::{CatalogStore, StoreError};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub updated_count: usize,
    pub inserted_count: usize,
}

/// Applies a write-set: one atomic update transaction, then one bulk insert.
///
/// Inserts are never attempted when the update phase fails.
pub struct BatchWriter<'a> {
    store: &'a dyn CatalogStore,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self { store }
    }

    pub async fn apply(
        &self,
        updates: &[UpdateOp],
        inserts: &[NormalizedRecord],
    ) -> Result<WriteSummary, StoreError> {
        let mut summary = WriteSummary::default();
        if !updates.is_empty() {
            summary.updated_count = self.store.update_products(updates).await?;
        }
        if !inserts.is_empty() {
            summary.inserted_count = self.store.create_products(inserts).await?;
        }
        info!(
            updated = summary.updated_count,
            inserted = summary.inserted_count,
            "write-set applied"
        );
        Ok(summary)
    }
}

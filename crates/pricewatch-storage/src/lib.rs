//! Catalog persistence behind the `CatalogStore` capability.

use async_trait::async_trait;
use pricewatch_core::{
    Category, NormalizedRecord, PageRequest, Product, ProductFilter, ProductPage, UpdateOp,
};
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "pricewatch-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("product {0} does not exist")]
    ProductNotFound(Uuid),
}

/// Persistence capability handed to every engine component.
///
/// `update_products` is the only operation with an atomicity contract: either every
/// update in the slice is applied or none is.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError>;

    async fn create_category(&self, name: &str) -> Result<Category, StoreError>;

    /// All categories, newest first.
    async fn list_categories(&self) -> Result<Vec<Category>, StoreError>;

    async fn find_all_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn find_product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn find_products_by_category(
        &self,
        category_id: Uuid,
        excluding: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError>;

    /// Filtered page of products, newest first.
    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<ProductPage, StoreError>;

    async fn update_products(&self, updates: &[UpdateOp]) -> Result<usize, StoreError>;

    async fn create_products(&self, records: &[NormalizedRecord]) -> Result<usize, StoreError>;
}

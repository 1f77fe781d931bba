use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use pricewatch_core::{
    Category, NormalizedRecord, PageRequest, Product, ProductFilter, ProductPage, UpdateOp,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{CatalogStore, StoreError};

#[derive(Debug, Default)]
struct Catalog {
    categories: Vec<Category>,
    products: Vec<Product>,
}

/// In-process store for tests and dry runs. Rows are kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: RwLock<Catalog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    let mut out = rows.iter().rev().cloned().collect::<Vec<_>>();
    out.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    out
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog.categories.iter().find(|c| c.name == name).cloned())
    }

    async fn create_category(&self, name: &str) -> Result<Category, StoreError> {
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.catalog.write().await.categories.push(category.clone());
        Ok(category)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(newest_first(&catalog.categories, |c| c.created_at))
    }

    async fn find_all_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.catalog.read().await.products.clone())
    }

    async fn find_product_by_id(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog.products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_products_by_category(
        &self,
        category_id: Uuid,
        excluding: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Product>, StoreError> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .products
            .iter()
            .filter(|p| p.category_id == category_id && Some(p.id) != excluding)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_products(
        &self,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> Result<ProductPage, StoreError> {
        let catalog = self.catalog.read().await;
        let matching = newest_first(&catalog.products, |p| p.created_at)
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect::<Vec<_>>();
        let total = matching.len() as u64;
        let data = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();
        Ok(ProductPage::new(data, total, page))
    }

    async fn update_products(&self, updates: &[UpdateOp]) -> Result<usize, StoreError> {
        let mut catalog = self.catalog.write().await;
        let known = catalog.products.iter().map(|p| p.id).collect::<HashSet<_>>();
        if let Some(missing) = updates.iter().find(|u| !known.contains(&u.product_id)) {
            return Err(StoreError::ProductNotFound(missing.product_id));
        }
        for update in updates {
            if let Some(product) = catalog
                .products
                .iter_mut()
                .find(|p| p.id == update.product_id)
            {
                update.apply_to(product);
            }
        }
        Ok(updates.len())
    }

    async fn create_products(&self, records: &[NormalizedRecord]) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut catalog = self.catalog.write().await;
        catalog.products.extend(records.iter().map(|r| Product {
            id: Uuid::new_v4(),
            name: r.name.clone(),
            image_url: r.image_url.clone(),
            prices: r.prices,
            category_id: r.category_id,
            created_at: now,
        }));
        Ok(records.len())
    }
}

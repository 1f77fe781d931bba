use std::fmt;

use pricewatch_core::{NormalizedRecord, Product};
use serde::Serialize;
use uuid::Uuid;

/// Deduplication unit: `lowercase(trim(name)) + "_" + category_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn build(name: &str, category_id: Uuid) -> Self {
        Self(format!("{}_{}", name.trim().to_lowercase(), category_id))
    }

    pub fn of_product(product: &Product) -> Self {
        Self::build(&product.name, product.category_id)
    }

    pub fn of_record(record: &NormalizedRecord) -> Self {
        Self::build(&record.name, record.category_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

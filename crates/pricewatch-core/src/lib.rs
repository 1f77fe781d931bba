//! Core catalog model shared by the ingestion engine, storage and web layers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "pricewatch-core";

/// Monetary amount in the source currency's smallest observed unit (no decimals).
pub type Amount = i64;

/// Sentinel for text fields that were not observed.
pub const NOT_AVAILABLE: &str = "N/A";

/// Sentinel for prices that were not observed or not offered.
pub const NO_PRICE: Amount = 0;

/// Retail channel whose price is tracked as an independent field per product.
///
/// Deserializes through `FromStr`, so registry tags are trimmed, case-insensitive and
/// accept the `olim` alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Distributor {
    D1,
    Exito,
    Olimpica,
}

impl Distributor {
    pub const ALL: [Distributor; 3] = [Distributor::D1, Distributor::Exito, Distributor::Olimpica];

    pub fn as_str(&self) -> &'static str {
        match self {
            Distributor::D1 => "d1",
            Distributor::Exito => "exito",
            Distributor::Olimpica => "olimpica",
        }
    }
}

impl fmt::Display for Distributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown distributor `{0}`")]
pub struct UnknownDistributor(pub String);

impl FromStr for Distributor {
    type Err = UnknownDistributor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d1" => Ok(Distributor::D1),
            "exito" => Ok(Distributor::Exito),
            "olimpica" | "olim" => Ok(Distributor::Olimpica),
            other => Err(UnknownDistributor(other.to_string())),
        }
    }
}

impl TryFrom<String> for Distributor {
    type Error = UnknownDistributor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One price slot per distributor; `0` means "not available from that distributor".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DistributorPrices {
    #[serde(rename = "price_d1")]
    pub d1: Amount,
    #[serde(rename = "price_exito")]
    pub exito: Amount,
    #[serde(rename = "price_olim")]
    pub olimpica: Amount,
}

impl DistributorPrices {
    /// Prices with a single observed slot and every other slot at the sentinel.
    pub fn only(distributor: Distributor, amount: Amount) -> Self {
        let mut prices = Self::default();
        prices.set(distributor, amount);
        prices
    }

    pub fn get(&self, distributor: Distributor) -> Amount {
        match distributor {
            Distributor::D1 => self.d1,
            Distributor::Exito => self.exito,
            Distributor::Olimpica => self.olimpica,
        }
    }

    pub fn set(&mut self, distributor: Distributor, amount: Amount) {
        let slot = match distributor {
            Distributor::D1 => &mut self.d1,
            Distributor::Exito => &mut self.exito,
            Distributor::Olimpica => &mut self.olimpica,
        };
        *slot = amount;
    }

    /// Slots holding a real (non-sentinel) price, in `Distributor::ALL` order.
    pub fn observed(&self) -> impl Iterator<Item = (Distributor, Amount)> + '_ {
        Distributor::ALL
            .into_iter()
            .map(|d| (d, self.get(d)))
            .filter(|(_, amount)| *amount != NO_PRICE)
    }

    /// True when any distributor offers the product at or below `threshold`.
    pub fn any_at_most(&self, threshold: Amount) -> bool {
        self.observed().any(|(_, amount)| amount <= threshold)
    }
}

/// Raw tuple yielded by an extractor for one listing card.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub price_text: Option<String>,
}

/// Canonical record built once from a raw record and consumed by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub name: String,
    pub image_url: String,
    #[serde(flatten)]
    pub prices: DistributorPrices,
    pub category_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    #[serde(flatten)]
    pub prices: DistributorPrices,
    pub category_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Partial update for one existing product. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOp {
    pub product_id: Uuid,
    pub prices: BTreeMap<Distributor, Amount>,
    pub image_url: Option<String>,
}

impl UpdateOp {
    pub fn new(product_id: Uuid) -> Self {
        Self {
            product_id,
            prices: BTreeMap::new(),
            image_url: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty() && self.image_url.is_none()
    }

    pub fn apply_to(&self, product: &mut Product) {
        for (distributor, amount) in &self.prices {
            product.prices.set(*distributor, *amount);
        }
        if let Some(image_url) = &self.image_url {
            product.image_url = image_url.clone();
        }
    }
}

/// Listing filter; every present field narrows the result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    pub category_id: Option<Uuid>,
    pub search_text: Option<String>,
    pub max_price: Option<Amount>,
}

impl ProductFilter {
    pub fn search_needle(&self) -> Option<String> {
        self.search_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category_id) = self.category_id {
            if product.category_id != category_id {
                return false;
            }
        }
        if let Some(needle) = self.search_needle() {
            if !product.name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if let Some(max_price) = self.max_price {
            if !product.prices.any_at_most(max_price) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_products: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub data: Vec<Product>,
    pub meta: PageMeta,
}

impl ProductPage {
    pub fn new(data: Vec<Product>, total_products: u64, page: PageRequest) -> Self {
        Self {
            data,
            meta: PageMeta {
                total_products,
                total_pages: total_products.div_ceil(u64::from(page.limit)),
                current_page: page.page,
                limit: page.limit,
            },
        }
    }
}

/// Per-run scraping parameters for one distributor listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapingConfig {
    pub base_url: String,
    pub website_name: Distributor,
    pub card_selector: String,
    pub name_selector: String,
    pub price_selector: String,
    pub image_selector: String,
}

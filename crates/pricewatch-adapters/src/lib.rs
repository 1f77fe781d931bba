//! Extractor contracts + listing-page extractors (live HTTP and captured fixtures).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use pricewatch_core::{Distributor, RawRecord, ScrapingConfig};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

mod fetch;

pub use fetch::{
    retry_after, retryable_status, retryable_transport, FetchError, FetchPolicy, ListingFetcher,
    ListingPage,
};

pub const CRATE_NAME: &str = "pricewatch-adapters";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
}

/// Everything one run gets from its extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedListing {
    pub source_url: String,
    pub distributor: Distributor,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("reading fixture {path}: {source}")]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        ctx: &AdapterContext,
        config: &ScrapingConfig,
    ) -> Result<ExtractedListing, AdapterError>;
}

fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn first_text(card: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>()))
}

fn first_image_src(card: &ElementRef<'_>, selector: &Selector, base: Option<&Url>) -> Option<String> {
    let node = card.select(selector).next()?;
    let src = node
        .value()
        .attr("src")
        .or_else(|| node.value().attr("data-src"))
        .and_then(|s| text_or_none(s.to_string()))?;
    match base.and_then(|b| b.join(&src).ok()) {
        Some(absolute) => Some(absolute.to_string()),
        None => Some(src),
    }
}

/// Applies the four selectors of `config` to a listing page.
///
/// Every card yields one record; sub-elements that are missing leave the
/// corresponding field absent.
pub fn parse_listing_html(html: &str, config: &ScrapingConfig) -> Result<Vec<RawRecord>, AdapterError> {
    let card_sel = parse_selector(&config.card_selector)?;
    let name_sel = parse_selector(&config.name_selector)?;
    let price_sel = parse_selector(&config.price_selector)?;
    let image_sel = parse_selector(&config.image_selector)?;
    let base = Url::parse(&config.base_url).ok();

    let document = Html::parse_document(html);
    Ok(document
        .select(&card_sel)
        .map(|card| RawRecord {
            name: first_text(&card, &name_sel),
            image_url: first_image_src(&card, &image_sel, base.as_ref()),
            price_text: first_text(&card, &price_sel),
        })
        .collect())
}

/// Fetches the configured listing page over HTTP and parses it.
#[derive(Debug, Clone)]
pub struct HtmlListingExtractor {
    http: Arc<ListingFetcher>,
}

impl HtmlListingExtractor {
    pub fn new(http: Arc<ListingFetcher>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Extractor for HtmlListingExtractor {
    async fn extract(
        &self,
        ctx: &AdapterContext,
        config: &ScrapingConfig,
    ) -> Result<ExtractedListing, AdapterError> {
        let page = self
            .http
            .fetch(ctx.run_id, config.website_name, &config.base_url)
            .await?;
        let records = parse_listing_html(&page.html, config)?;
        debug!(
            source = %config.website_name,
            status = page.status,
            final_url = %page.final_url,
            cards = records.len(),
            "parsed listing page"
        );
        Ok(ExtractedListing {
            source_url: config.base_url.clone(),
            distributor: config.website_name,
            records,
        })
    }
}

/// Serves captured listing pages from `<root>/<website_name>/listing.html`.
#[derive(Debug, Clone)]
pub struct FixtureExtractor {
    root: PathBuf,
}

impl FixtureExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn fixture_path(&self, distributor: Distributor) -> PathBuf {
        self.root.join(distributor.as_str()).join("listing.html")
    }
}

#[async_trait]
impl Extractor for FixtureExtractor {
    async fn extract(
        &self,
        _ctx: &AdapterContext,
        config: &ScrapingConfig,
    ) -> Result<ExtractedListing, AdapterError> {
        let path = self.fixture_path(config.website_name);
        let html = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| AdapterError::Fixture {
                path: path.clone(),
                source,
            })?;
        Ok(ExtractedListing {
            source_url: config.base_url.clone(),
            distributor: config.website_name,
            records: parse_listing_html(&html, config)?,
        })
    }
}

//! Axum JSON API over the catalog: product listing, comparison and categories.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use pricewatch_core::{Amount, PageRequest, ProductFilter};
use pricewatch_storage::{CatalogStore, PgStore, StoreError};
use pricewatch_sync::query::{compare_product, list_categories, list_products};
use pricewatch_sync::SyncConfig;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

pub const CRATE_NAME: &str = "pricewatch-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ProductsQuery {
    page: Option<u32>,
    limit: Option<u32>,
    category_id: Option<Uuid>,
    search: Option<String>,
    max_price: Option<Amount>,
}

impl ProductsQuery {
    fn filter(&self) -> ProductFilter {
        ProductFilter {
            category_id: self.category_id,
            search_text: self.search.clone(),
            max_price: self.max_price,
        }
    }

    fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/products", get(products_handler))
        .route("/api/products/{id}/compare", get(compare_handler))
        .route("/api/categories", get(categories_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "catalog api listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let port: u16 = std::env::var("PRICEWATCH_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let config = SyncConfig::from_env();
    let store = PgStore::connect(&config.database_url).await?;
    serve(AppState::new(Arc::new(store)), port).await
}

async fn health_handler() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

async fn products_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductsQuery>,
) -> Response {
    match list_products(state.store.as_ref(), &query.filter(), query.page()).await {
        Ok(page) => Json(page).into_response(),
        Err(err) => store_error(err),
    }
}

async fn compare_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<Uuid>,
) -> Response {
    match compare_product(state.store.as_ref(), id).await {
        Ok(Some(comparison)) => Json(comparison).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "product not found" })),
        )
            .into_response(),
        Err(err) => store_error(err),
    }
}

async fn categories_handler(State(state): State<Arc<AppState>>) -> Response {
    match list_categories(state.store.as_ref()).await {
        Ok(categories) => Json(json!({ "data": categories })).into_response(),
        Err(err) => store_error(err),
    }
}

fn store_error(err: StoreError) -> Response {
    error!(error = %err, "catalog query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "catalog query failed" })),
    )
        .into_response()
}

//! Public catalog routes

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        FeaturedProduct, Product, ProductPage, ProductSearchQuery, SearchParams, SeedService,
        Service,
    },
    seed::{FEATURED_PRODUCTS, SEED_SERVICES},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/services", get(list_services))
        .route("/api/products", get(featured_products))
        .route("/api/products/db", get(list_products))
        .route("/api/products/search", get(search_products))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "Sight Tech API" }))
}

/// Either stored services or the built-in list
#[derive(Serialize)]
#[serde(untagged)]
pub enum ServiceListing {
    Stored(Vec<Service>),
    Defaults(&'static [SeedService]),
}

/// Stored services, falling back to the built-in list when there are none
pub async fn list_services(State(state): State<AppState>) -> ApiResult<Json<ServiceListing>> {
    let Ok(services) = state.services() else {
        return Ok(Json(ServiceListing::Defaults(SEED_SERVICES)));
    };

    let rows = services.list().await.map_err(|e| {
        error!("Failed to fetch services: {}", e);
        ApiError::Internal("Failed to fetch services".to_string())
    })?;

    if rows.is_empty() {
        return Ok(Json(ServiceListing::Defaults(SEED_SERVICES)));
    }
    Ok(Json(ServiceListing::Stored(rows)))
}

pub async fn featured_products() -> Json<&'static [FeaturedProduct]> {
    Json(FEATURED_PRODUCTS)
}

pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<Product>>> {
    let Ok(products) = state.products() else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(products.list().await?))
}

pub async fn search_products(
    State(state): State<AppState>,
    Query(query): Query<ProductSearchQuery>,
) -> ApiResult<Json<ProductPage>> {
    let Ok(products) = state.products() else {
        return Ok(Json(ProductPage::unavailable()));
    };

    let params = SearchParams::from_query(&query);
    let (items, total) = products.search(&params).await?;

    Ok(Json(ProductPage {
        items,
        total,
        page: params.page,
        page_size: params.page_size,
    }))
}

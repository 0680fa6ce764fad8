//! Storefront HTTP routes

pub mod admin;
pub mod appointments;
pub mod auth;
pub mod catalog;
pub mod quotes;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create the router for the storefront service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(catalog::router())
        .merge(auth::router(&state))
        .merge(admin::router(&state))
        .merge(appointments::router(&state))
        .merge(quotes::router(&state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

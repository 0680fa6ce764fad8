//! Sight Tech storefront backend
//!
//! HTTP API for the shop: catalog, accounts, appointments and quote
//! requests, with a startup schema reconciler and admission control on the
//! password-reset endpoint.

pub mod admission;
pub mod config;
pub mod error;
pub mod jwt;
pub mod mailer;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repositories;
pub mod routes;
pub mod schema;
pub mod seed;
pub mod state;
pub mod validation;

pub use routes::create_router;
pub use state::AppState;

//! Common library for the storefront backend
//!
//! This crate provides shared functionality used by the storefront service:
//! database connectivity, the Redis client, error types and the schema
//! reconciliation engine.

pub mod cache;
pub mod database;
pub mod error;
pub mod schema;

/// Example usage of the database and schema modules
///
/// ```rust,no_run
/// use common::database::connect_from_env;
/// use common::schema::{PgCatalog, Reconciler};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     if let Some(pool) = connect_from_env().await {
///         let report = Reconciler::new(Vec::new()).run(&PgCatalog::new(pool)).await?;
///         println!("Applied {} steps", report.applied.len());
///     }
///     Ok(())
/// }
/// ```
pub fn example_usage() {}

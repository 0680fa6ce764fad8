//! Services and products offered by the shop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const PRODUCT_CONDITIONS: &[&str] = &["new", "refurbished"];
pub const PRODUCT_CATEGORIES: &[&str] = &["laptop", "accessory"];

/// Service entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Built-in service listed when the database has none
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SeedService {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

/// Service create/update payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServicePayload {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Product entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub price: f64,
    pub condition: String,
    pub specs: Vec<String>,
    pub image_url: Option<String>,
    pub category: String,
    #[sqlx(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Static product shown on the landing page
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeaturedProduct {
    pub id: &'static str,
    pub name: &'static str,
    pub price: f64,
    pub condition: &'static str,
    pub specs: &'static [&'static str],
}

/// Product create/update payload
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub condition: Option<String>,
    pub specs: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub category: Option<String>,
}

/// Validated product ready to insert
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    pub condition: String,
    pub specs: Vec<String>,
    pub image_url: Option<String>,
    pub category: String,
}

/// Validated partial product update; `None` leaves a column unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub condition: Option<String>,
    pub specs: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub category: Option<String>,
}

/// Raw query string of `GET /api/products/search`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSearchQuery {
    pub category: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

impl SortOrder {
    /// Unknown values sort by newest
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("price_asc") => SortOrder::PriceAsc,
            Some("price_desc") => SortOrder::PriceDesc,
            _ => SortOrder::Newest,
        }
    }

    pub fn order_by(self) -> &'static str {
        match self {
            SortOrder::Newest => "created_at DESC",
            SortOrder::PriceAsc => "price ASC, created_at DESC",
            SortOrder::PriceDesc => "price DESC, created_at DESC",
        }
    }
}

/// Normalised search parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub category: Option<String>,
    pub sort: SortOrder,
    pub page: i64,
    pub page_size: i64,
}

impl SearchParams {
    pub const DEFAULT_PAGE_SIZE: i64 = 12;
    pub const MAX_PAGE_SIZE: i64 = 100;

    pub fn from_query(query: &ProductSearchQuery) -> Self {
        let page = query
            .page
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|page| *page >= 1)
            .unwrap_or(1);
        let page_size = query
            .page_size
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|size| (1..=Self::MAX_PAGE_SIZE).contains(size))
            .unwrap_or(Self::DEFAULT_PAGE_SIZE);

        Self {
            category: query.category.clone().filter(|c| !c.is_empty()),
            sort: SortOrder::parse(query.sort.as_deref()),
            page,
            page_size,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl ProductPage {
    /// Page returned when the catalog has no database behind it
    pub fn unavailable() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            page_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, page_size: Option<&str>, sort: Option<&str>) -> ProductSearchQuery {
        ProductSearchQuery {
            category: None,
            sort: sort.map(str::to_string),
            page: page.map(str::to_string),
            page_size: page_size.map(str::to_string),
        }
    }

    #[test]
    fn test_search_defaults() {
        let params = SearchParams::from_query(&ProductSearchQuery::default());
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, 12);
        assert_eq!(params.sort, SortOrder::Newest);
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_search_clamps_out_of_range_values() {
        let params = SearchParams::from_query(&query(Some("0"), Some("101"), Some("cheapest")));
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, 12);
        assert_eq!(params.sort, SortOrder::Newest);

        let params = SearchParams::from_query(&query(Some("abc"), Some("-3"), None));
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, 12);
    }

    #[test]
    fn test_search_offset() {
        let params = SearchParams::from_query(&query(Some("3"), Some("20"), Some("price_desc")));
        assert_eq!(params.offset(), 40);
        assert_eq!(params.sort.order_by(), "price DESC, created_at DESC");
    }
}

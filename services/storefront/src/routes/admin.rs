//! Admin catalog management

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    routing::{get, put},
};
use axum_extra::extract::WithRejection;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    error::{ApiError, ApiResult, is_unique_violation},
    middleware::{admin_only, auth_middleware},
    models::{
        NewProduct, Product, ProductPayload, ProductUpdate, Service, ServicePayload,
        catalog::{PRODUCT_CATEGORIES, PRODUCT_CONDITIONS},
    },
    schema::SERVICE_CATEGORIES,
    state::AppState,
    validation::{
        Validator, slugify, validate_min_length, validate_one_of, validate_service_id,
        validate_url,
    },
};

const DEFAULT_PRODUCT_CATEGORY: &str = "laptop";

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/products", get(list_products).post(create_product))
        .route(
            "/api/admin/products/:id",
            put(update_product).delete(delete_product),
        )
        .route("/api/admin/services", get(list_services).post(create_service))
        .route(
            "/api/admin/services/:id",
            put(update_service).delete(delete_service),
        )
        .route_layer(middleware::from_fn(admin_only))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
}

fn validate_price(price: f64) -> Result<(), String> {
    if !price.is_finite() || price <= 0.0 {
        return Err("Price must be positive".to_string());
    }
    Ok(())
}

/// Field checks shared by create and update
fn check_product_fields(validator: &mut Validator, payload: &ProductPayload) {
    if let Some(name) = &payload.name {
        validator.check("name", validate_min_length(name, 1));
    }
    if let Some(price) = payload.price {
        validator.check("price", validate_price(price));
    }
    if let Some(condition) = &payload.condition {
        validator.check("condition", validate_one_of(condition, PRODUCT_CONDITIONS));
    }
    if let Some(image_url) = &payload.image_url {
        validator.check("imageUrl", validate_url(image_url));
    }
    if let Some(category) = &payload.category {
        validator.check("category", validate_one_of(category, PRODUCT_CATEGORIES));
    }
}

fn parse_new_product(payload: ProductPayload) -> ApiResult<NewProduct> {
    let mut validator = Validator::new();
    check_product_fields(&mut validator, &payload);
    let name = validator.require("name", payload.name);
    let price = validator.require("price", payload.price);
    let condition = validator.require("condition", payload.condition);
    validator.finish()?;

    let (Some(name), Some(price), Some(condition)) = (name, price, condition) else {
        return Err(ApiError::BadRequest("Invalid payload".to_string()));
    };
    Ok(NewProduct {
        name,
        price,
        condition,
        specs: payload.specs.unwrap_or_default(),
        image_url: payload.image_url,
        category: payload
            .category
            .unwrap_or_else(|| DEFAULT_PRODUCT_CATEGORY.to_string()),
    })
}

fn parse_product_update(payload: ProductPayload) -> ApiResult<ProductUpdate> {
    let mut validator = Validator::new();
    check_product_fields(&mut validator, &payload);
    validator.finish()?;

    Ok(ProductUpdate {
        name: payload.name,
        price: payload.price,
        condition: payload.condition,
        specs: payload.specs,
        image_url: payload.image_url,
        category: payload.category,
    })
}

/// Validated service with its final slug
#[derive(Debug, PartialEq, Eq)]
struct NewService {
    id: String,
    title: String,
    description: String,
    category: String,
}

fn check_service_fields(validator: &mut Validator, payload: &ServicePayload) {
    if let Some(id) = &payload.id {
        validator.check("id", validate_service_id(id));
    }
    if let Some(title) = &payload.title {
        validator.check("title", validate_min_length(title, 1));
    }
    if let Some(description) = &payload.description {
        validator.check("description", validate_min_length(description, 1));
    }
    if let Some(category) = &payload.category {
        validator.check("category", validate_one_of(category, SERVICE_CATEGORIES));
    }
}

/// The id defaults to a slug of the title
fn parse_new_service(payload: ServicePayload) -> ApiResult<NewService> {
    let mut validator = Validator::new();
    check_service_fields(&mut validator, &payload);
    let title = validator.require("title", payload.title);
    let description = validator.require("description", payload.description);
    let category = validator.require("category", payload.category);

    let id = match (payload.id, &title) {
        (Some(id), _) => Some(id),
        (None, Some(title)) => {
            let slug = slugify(title);
            validator.check("id", validate_service_id(&slug));
            Some(slug)
        }
        (None, None) => None,
    };
    validator.finish()?;

    match (id, title, description, category) {
        (Some(id), Some(title), Some(description), Some(category)) => Ok(NewService {
            id,
            title,
            description,
            category,
        }),
        _ => Err(ApiError::BadRequest("Invalid payload".to_string())),
    }
}

pub async fn list_products(State(state): State<AppState>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.products()?.list().await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<ProductPayload>, ApiError>,
) -> ApiResult<Json<Product>> {
    let products = state.products()?;
    let product = products.create(&parse_new_product(payload)?).await?;
    info!("Created product {}", product.id);
    Ok(Json(product))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    WithRejection(Json(payload), _): WithRejection<Json<ProductPayload>, ApiError>,
) -> ApiResult<Json<Product>> {
    let products = state.products()?;
    let update = parse_product_update(payload)?;

    let product = products
        .update(id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Value>> {
    let deleted = state.products()?.delete(id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn list_services(State(state): State<AppState>) -> ApiResult<Json<Vec<Service>>> {
    Ok(Json(state.services()?.list_detailed().await?))
}

pub async fn create_service(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<ServicePayload>, ApiError>,
) -> ApiResult<Json<Service>> {
    let services = state.services()?;
    let service = parse_new_service(payload)?;

    let created = services
        .create(
            &service.id,
            &service.title,
            &service.description,
            &service.category,
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Service id already exists".to_string())
            } else {
                error!("Failed to create service: {}", e);
                ApiError::Internal("Failed to create service".to_string())
            }
        })?;

    info!("Created service {}", created.id);
    Ok(Json(created))
}

/// Update title, description or category; a supplied `id` is ignored
pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<ServicePayload>, ApiError>,
) -> ApiResult<Json<Service>> {
    let services = state.services()?;

    let mut validator = Validator::new();
    check_service_fields(&mut validator, &payload);
    validator.finish()?;

    let service = services
        .update(
            &id,
            payload.title.as_deref(),
            payload.description.as_deref(),
            payload.category.as_deref(),
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;
    Ok(Json(service))
}

pub async fn delete_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let deleted = state.services()?.delete(&id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

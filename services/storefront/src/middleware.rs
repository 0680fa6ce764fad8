//! Middleware for JWT authentication and role checks

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::debug;

use crate::{
    error::{ApiError, ApiResult},
    jwt::Claims,
    models::Role,
    state::AppState,
};

/// Authenticated caller, inserted into request extensions
pub type AuthUser = Claims;

/// Validate the bearer token and expose its claims to handlers
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;

    let claims = state
        .jwt_service
        .validate_token(bearer.token())
        .map_err(|e| {
            debug!("Rejected bearer token: {}", e);
            ApiError::Unauthorized
        })?;

    req.extensions_mut().insert::<AuthUser>(claims);
    Ok(next.run(req).await)
}

/// Require an authenticated admin; must run after `auth_middleware`
pub async fn admin_only(req: Request, next: Next) -> ApiResult<Response> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .ok_or(ApiError::Unauthorized)?;

    if user.role != Role::Admin {
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(req).await)
}

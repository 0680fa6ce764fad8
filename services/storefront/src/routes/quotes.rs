//! Quote requests from the contact form

use axum::{
    Extension, Json, Router,
    extract::State,
    middleware,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use tracing::{error, info};

use crate::{
    error::{ApiError, ApiResult},
    middleware::{AuthUser, auth_middleware},
    models::{Quote, QuoteReceipt, QuoteRequest, QuoteSubmission},
    state::AppState,
    validation::{Validator, validate_email, validate_min_length},
};

const RECENT_QUOTES: i64 = 10;

pub fn router(state: &AppState) -> Router<AppState> {
    let mine = Router::new()
        .route("/api/quotes/my", get(my_quotes))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/quote", post(submit_quote))
        .route("/api/quotes/recent", get(recent_quotes))
        .merge(mine)
}

fn parse_quote(payload: QuoteRequest) -> ApiResult<QuoteSubmission> {
    let mut validator = Validator::new();
    let name = validator.require("name", payload.name);
    if let Some(name) = &name {
        validator.check("name", validate_min_length(name, 1));
    }
    let email = validator.require("email", payload.email);
    if let Some(email) = &email {
        validator.check("email", validate_email(email));
    }
    let message = validator.require("message", payload.message);
    if let Some(message) = &message {
        validator.check("message", validate_min_length(message, 5));
    }
    validator.finish()?;

    match (name, email, message) {
        (Some(name), Some(email), Some(message)) => Ok(QuoteSubmission {
            name,
            email,
            message,
        }),
        _ => Err(ApiError::BadRequest("Invalid payload".to_string())),
    }
}

/// Store the request when a database is present, then send both e-mails
pub async fn submit_quote(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<QuoteRequest>, ApiError>,
) -> ApiResult<Json<QuoteReceipt>> {
    let quote = parse_quote(payload)?;

    match state.quotes() {
        Ok(quotes) => quotes.create(&quote).await.map_err(|e| {
            error!("Failed to save quote: {}", e);
            ApiError::Internal("Failed to save quote".to_string())
        })?,
        Err(_) => info!("New quote request (no DB) from {}", quote.email),
    }

    let emailed = state.mailer.send_quote_notification(&quote).await;
    let auto_reply = state.mailer.send_quote_auto_reply(&quote).await;

    Ok(Json(QuoteReceipt {
        ok: true,
        emailed,
        auto_reply,
    }))
}

pub async fn recent_quotes(State(state): State<AppState>) -> ApiResult<Json<Vec<Quote>>> {
    let quotes = state.quotes()?.recent(RECENT_QUOTES).await.map_err(|e| {
        error!("Failed to fetch recent quotes: {}", e);
        ApiError::Internal("Failed to fetch quotes".to_string())
    })?;
    Ok(Json(quotes))
}

/// Quotes sent from the caller's e-mail address
pub async fn my_quotes(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<Quote>>> {
    Ok(Json(state.quotes()?.by_email(&auth.email).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quote() {
        let quote = parse_quote(QuoteRequest {
            name: Some("Ama".to_string()),
            email: Some("ama@example.com".to_string()),
            message: Some("Cracked screen on a Pixel 7".to_string()),
        })
        .unwrap();
        assert_eq!(quote.name, "Ama");
    }

    #[test]
    fn test_parse_quote_requires_a_real_message() {
        let err = parse_quote(QuoteRequest {
            name: Some("Ama".to_string()),
            email: Some("ama@example.com".to_string()),
            message: Some("hi".to_string()),
        })
        .unwrap_err();
        match err {
            ApiError::InvalidPayload(details) => {
                assert!(details["fieldErrors"]["message"].is_array());
                assert!(details["fieldErrors"].get("email").is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! Account routes: registration, login, profile and password reset

use axum::{
    Extension, Json, Router,
    extract::State,
    middleware,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use chrono::{Duration, Utc};
use common::schema::split_full_name;
use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    admission::rate_limit_password_reset,
    error::{ApiError, ApiResult, is_unique_violation},
    middleware::{AuthUser, auth_middleware},
    models::{
        ApiUser, AuthResponse, ForgotPasswordRequest, LoginRequest, NewUser, Profile,
        RegisterRequest, ResetPasswordRequest, Role, UpdateProfileRequest, User,
    },
    password::{generate_otp, hash_password, verify_password},
    state::AppState,
    validation::{Validator, validate_email, validate_min_length, validate_password},
};

/// Lifetime of a password reset code
const OTP_VALIDITY_MINUTES: i64 = 15;

pub fn router(state: &AppState) -> Router<AppState> {
    let profile = Router::new()
        .route("/api/auth/me", get(get_profile).put(update_profile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route(
            "/api/auth/forgot",
            post(forgot_password).layer(middleware::from_fn_with_state(
                state.reset_gate.clone(),
                rate_limit_password_reset,
            )),
        )
        .route("/api/auth/reset", post(reset_password))
        .merge(profile)
}

/// Validated registration
#[derive(Debug, PartialEq, Eq)]
struct Registration {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
}

/// Accept `firstName`/`lastName`, falling back to a legacy single `name`
fn parse_registration(payload: RegisterRequest) -> ApiResult<Registration> {
    let mut validator = Validator::new();

    let email = validator.require("email", payload.email);
    if let Some(email) = &email {
        validator.check("email", validate_email(email));
    }
    let password = validator.require("password", payload.password);
    if let Some(password) = &password {
        validator.check("password", validate_password(password));
    }

    let names = match (payload.first_name, payload.last_name, payload.name) {
        (Some(first), Some(last), _) if !first.is_empty() && !last.is_empty() => {
            Some((first, last))
        }
        (_, _, Some(name)) if !name.is_empty() => Some(split_full_name(&name)),
        _ => {
            validator.check("name", Err("Required".to_string()));
            None
        }
    };

    validator.finish()?;
    match (names, email, password) {
        (Some((first_name, last_name)), Some(email), Some(password)) => Ok(Registration {
            first_name,
            last_name,
            email: email.to_lowercase(),
            password,
        }),
        _ => Err(ApiError::BadRequest("Invalid payload".to_string())),
    }
}

fn issue_token(state: &AppState, user: &User) -> ApiResult<String> {
    state.jwt_service.generate_token(user).map_err(|e| {
        error!("Failed to generate token: {}", e);
        ApiError::Internal("Failed to issue token".to_string())
    })
}

/// Register a new account; the very first account becomes an admin
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> ApiResult<Json<AuthResponse>> {
    let users = state.users()?;
    let registration = parse_registration(payload)?;

    let password_hash = hash_password(&registration.password).map_err(|e| {
        error!("Register failed: {}", e);
        ApiError::Internal("Register failed".to_string())
    })?;
    let role = if users.count().await? == 0 {
        Role::Admin
    } else {
        Role::User
    };

    let user = users
        .create(&NewUser {
            first_name: registration.first_name,
            last_name: registration.last_name,
            email: registration.email,
            password_hash,
            role,
        })
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Email already registered".to_string())
            } else {
                error!("Register failed: {}", e);
                ApiError::Internal("Register failed".to_string())
            }
        })?;

    info!("Registered user {} as {}", user.id, user.role.as_str());
    let token = issue_token(&state, &user)?;
    let api_user = ApiUser::from(&user);

    let mailer = state.mailer.clone();
    let (name, email) = (api_user.name.clone(), api_user.email.clone());
    tokio::spawn(async move {
        mailer.send_welcome(&name, &email).await;
    });

    Ok(Json(AuthResponse {
        user: api_user,
        token,
    }))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<Json<AuthResponse>> {
    let users = state.users()?;

    let mut validator = Validator::new();
    let email = validator.require("email", payload.email);
    if let Some(email) = &email {
        validator.check("email", validate_email(email));
    }
    let password = validator.require("password", payload.password);
    if let Some(password) = &password {
        validator.check("password", validate_min_length(password, 1));
    }
    validator.finish()?;
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::BadRequest("Invalid payload".to_string()));
    };

    let user = users
        .find_by_email(&email.to_lowercase())
        .await?
        .ok_or_else(|| ApiError::NotFound("Email not found".to_string()))?;

    if !verify_password(&password, &user.password_hash) {
        return Err(ApiError::IncorrectPassword);
    }

    let token = issue_token(&state, &user)?;
    Ok(Json(AuthResponse {
        user: ApiUser::from(&user),
        token,
    }))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Profile>> {
    let user = state
        .users()?
        .find_by_id(auth.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;

    Ok(Json(Profile::from(&user)))
}

/// Update name or e-mail; a fresh token is issued since the e-mail may change
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> ApiResult<Json<AuthResponse>> {
    let users = state.users()?;

    let mut validator = Validator::new();
    if let Some(first_name) = &payload.first_name {
        validator.check("firstName", validate_min_length(first_name, 1));
    }
    if let Some(last_name) = &payload.last_name {
        validator.check("lastName", validate_min_length(last_name, 1));
    }
    if let Some(email) = &payload.email {
        validator.check("email", validate_email(email));
    }
    validator.finish()?;

    if payload.first_name.is_none() && payload.last_name.is_none() && payload.email.is_none() {
        return Err(ApiError::BadRequest("Nothing to update".to_string()));
    }

    let email = payload.email.as_deref().map(str::to_lowercase);
    let user = users
        .update_profile(
            auth.id,
            payload.first_name.as_deref(),
            payload.last_name.as_deref(),
            email.as_deref(),
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Email already in use".to_string())
            } else {
                error!("Update profile failed: {}", e);
                ApiError::Internal("Update failed".to_string())
            }
        })?
        .ok_or_else(|| ApiError::NotFound("Not found".to_string()))?;

    let token = issue_token(&state, &user)?;
    Ok(Json(AuthResponse {
        user: ApiUser::from(&user),
        token,
    }))
}

/// Issue a one-time reset code
///
/// Answers `{ok: true}` whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<ForgotPasswordRequest>, ApiError>,
) -> ApiResult<Json<Value>> {
    let users = state.users()?;
    let resets = state.password_resets()?;

    let mut validator = Validator::new();
    let email = validator.require("email", payload.email);
    if let Some(email) = &email {
        validator.check("email", validate_email(email));
    }
    validator.finish()?;
    let Some(email) = email else {
        return Err(ApiError::BadRequest("Invalid payload".to_string()));
    };

    let Some(user) = users.find_by_email(&email.to_lowercase()).await? else {
        return Ok(Json(json!({ "ok": true })));
    };

    let otp = generate_otp();
    let expires_at = Utc::now() + Duration::minutes(OTP_VALIDITY_MINUTES);
    resets.create(user.id, &otp, expires_at).await?;

    state
        .mailer
        .send_password_reset_code(&user.full_name(), &user.email, &otp)
        .await;

    Ok(Json(json!({ "ok": true })))
}

/// Set a new password using the latest unused, unexpired code
pub async fn reset_password(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<ResetPasswordRequest>, ApiError>,
) -> ApiResult<Json<Value>> {
    let users = state.users()?;
    let resets = state.password_resets()?;

    let mut validator = Validator::new();
    let email = validator.require("email", payload.email);
    if let Some(email) = &email {
        validator.check("email", validate_email(email));
    }
    let otp = validator.require("otp", payload.otp);
    if let Some(otp) = &otp {
        validator.check("otp", validate_min_length(otp, 4));
    }
    let new_password = validator.require("newPassword", payload.new_password);
    if let Some(new_password) = &new_password {
        validator.check("newPassword", validate_password(new_password));
    }
    validator.finish()?;
    let (Some(email), Some(otp), Some(new_password)) = (email, otp, new_password) else {
        return Err(ApiError::BadRequest("Invalid payload".to_string()));
    };

    let Some(user) = users.find_by_email(&email.to_lowercase()).await? else {
        return Err(ApiError::BadRequest("Invalid reset code".to_string()));
    };

    let reset = resets
        .latest_active(user.id)
        .await?
        .filter(|reset| reset.otp == otp)
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired code".to_string()))?;

    let password_hash = hash_password(&new_password).map_err(|e| {
        error!("Password reset failed: {}", e);
        ApiError::Internal("Reset failed".to_string())
    })?;
    users.update_password(user.id, &password_hash).await?;
    resets.mark_used(reset.id).await?;

    info!("Password reset for user {}", user.id);
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        first: Option<&str>,
        last: Option<&str>,
        name: Option<&str>,
    ) -> RegisterRequest {
        RegisterRequest {
            first_name: first.map(str::to_string),
            last_name: last.map(str::to_string),
            name: name.map(str::to_string),
            email: Some("Jane@Example.com".to_string()),
            password: Some("secret1".to_string()),
        }
    }

    #[test]
    fn test_registration_with_split_names() {
        let registration = parse_registration(request(Some("Jane"), Some("Doe"), None)).unwrap();
        assert_eq!(registration.first_name, "Jane");
        assert_eq!(registration.last_name, "Doe");
        assert_eq!(registration.email, "jane@example.com");
    }

    #[test]
    fn test_registration_with_legacy_name() {
        let registration =
            parse_registration(request(None, None, Some("Mary Ann Smith"))).unwrap();
        assert_eq!(registration.first_name, "Mary");
        assert_eq!(registration.last_name, "Ann Smith");

        let registration = parse_registration(request(Some("Cher"), Some(""), Some("Cher")))
            .unwrap();
        assert_eq!(registration.first_name, "Cher");
        assert_eq!(registration.last_name, "");
    }

    #[test]
    fn test_registration_requires_a_name() {
        let err = parse_registration(request(Some("Jane"), None, None)).unwrap_err();
        match err {
            ApiError::InvalidPayload(details) => {
                assert_eq!(details["fieldErrors"]["name"][0], "Required");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_registration_rejects_short_password() {
        let mut payload = request(Some("Jane"), Some("Doe"), None);
        payload.password = Some("123".to_string());
        assert!(matches!(
            parse_registration(payload),
            Err(ApiError::InvalidPayload(_))
        ));
    }
}

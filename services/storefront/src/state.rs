//! Application state shared across handlers

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    admission::PasswordResetGate,
    config::AppConfig,
    error::{ApiError, ApiResult},
    jwt::JwtService,
    mailer::Mailer,
    repositories::{
        AppointmentRepository, PasswordResetRepository, ProductRepository, QuoteRepository,
        ServiceRepository, UserRepository,
    },
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// `None` when no database is configured; DB-backed endpoints answer 503
    pub db_pool: Option<PgPool>,
    pub jwt_service: JwtService,
    pub mailer: Mailer,
    pub reset_gate: PasswordResetGate,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn db(&self) -> ApiResult<&PgPool> {
        self.db_pool.as_ref().ok_or(ApiError::DatabaseNotConfigured)
    }

    pub fn users(&self) -> ApiResult<UserRepository> {
        Ok(UserRepository::new(self.db()?.clone()))
    }

    pub fn products(&self) -> ApiResult<ProductRepository> {
        Ok(ProductRepository::new(self.db()?.clone()))
    }

    pub fn services(&self) -> ApiResult<ServiceRepository> {
        Ok(ServiceRepository::new(self.db()?.clone()))
    }

    pub fn appointments(&self) -> ApiResult<AppointmentRepository> {
        Ok(AppointmentRepository::new(self.db()?.clone()))
    }

    pub fn quotes(&self) -> ApiResult<QuoteRepository> {
        Ok(QuoteRepository::new(self.db()?.clone()))
    }

    pub fn password_resets(&self) -> ApiResult<PasswordResetRepository> {
        Ok(PasswordResetRepository::new(self.db()?.clone()))
    }
}

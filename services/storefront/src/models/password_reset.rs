//! One-time password reset codes

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Password reset entity
#[derive(Debug, Clone, FromRow)]
pub struct PasswordReset {
    pub id: i32,
    pub otp: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

//! Password reset code repository

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::PasswordReset;

#[derive(Clone)]
pub struct PasswordResetRepository {
    pool: PgPool,
}

impl PasswordResetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i32,
        otp: &str,
        expires_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO password_resets (user_id, otp, expires_at) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(otp)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recently issued code that is neither used nor expired
    pub async fn latest_active(&self, user_id: i32) -> sqlx::Result<Option<PasswordReset>> {
        sqlx::query_as::<_, PasswordReset>(
            r#"
            SELECT id, otp, expires_at, used_at
            FROM password_resets
            WHERE user_id = $1 AND used_at IS NULL AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn mark_used(&self, id: i32) -> sqlx::Result<()> {
        sqlx::query("UPDATE password_resets SET used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

//! Quote repository

use sqlx::PgPool;

use crate::models::{Quote, QuoteSubmission};

#[derive(Clone)]
pub struct QuoteRepository {
    pool: PgPool,
}

impl QuoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, quote: &QuoteSubmission) -> sqlx::Result<()> {
        sqlx::query("INSERT INTO quotes (name, email, message) VALUES ($1, $2, $3)")
            .bind(&quote.name)
            .bind(&quote.email)
            .bind(&quote.message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn recent(&self, limit: i64) -> sqlx::Result<Vec<Quote>> {
        sqlx::query_as::<_, Quote>(
            r#"
            SELECT id, name, email, message, created_at
            FROM quotes
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn by_email(&self, email: &str) -> sqlx::Result<Vec<Quote>> {
        sqlx::query_as::<_, Quote>(
            r#"
            SELECT id, name, email, message, created_at
            FROM quotes
            WHERE email = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
    }
}

//! Service repository

use sqlx::PgPool;

use crate::models::{SeedService, Service};

#[derive(Clone)]
pub struct ServiceRepository {
    pool: PgPool,
}

impl ServiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM services")
            .fetch_one(&self.pool)
            .await
    }

    /// Services for the public listing, newest first
    pub async fn list(&self) -> sqlx::Result<Vec<Service>> {
        sqlx::query_as::<_, Service>(
            "SELECT id, title, description, category FROM services ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Services with their creation time, for the admin listing
    pub async fn list_detailed(&self) -> sqlx::Result<Vec<Service>> {
        sqlx::query_as::<_, Service>(
            r#"
            SELECT id, title, description, category, created_at
            FROM services
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create(
        &self,
        id: &str,
        title: &str,
        description: &str,
        category: &str,
    ) -> sqlx::Result<Service> {
        sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (id, title, description, category)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, description, category
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(category)
        .fetch_one(&self.pool)
        .await
    }

    /// Insert a built-in service unless its id is taken
    pub async fn insert_seed(&self, service: &SeedService) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO services (id, title, description, category)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(service.id)
        .bind(service.title)
        .bind(service.description)
        .bind(service.category)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the given fields; the id itself never changes
    pub async fn update(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<&str>,
        category: Option<&str>,
    ) -> sqlx::Result<Option<Service>> {
        sqlx::query_as::<_, Service>(
            r#"
            UPDATE services
            SET title = COALESCE($1, title),
                description = COALESCE($2, description),
                category = COALESCE($3, category)
            WHERE id = $4
            RETURNING id, title, description, category
            "#,
        )
        .bind(title)
        .bind(description)
        .bind(category)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete(&self, id: &str) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM services WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

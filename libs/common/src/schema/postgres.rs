//! PostgreSQL catalog backed by `information_schema` introspection

use async_trait::async_trait;
use sqlx::PgPool;

use super::{SchemaCatalog, Statement};
use crate::error::{DatabaseError, DatabaseResult};

/// Catalog over a live PostgreSQL database, scoped to `current_schema()`
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, sql: &str, binds: &[&str]) -> DatabaseResult<bool> {
        let mut query = sqlx::query_scalar::<_, bool>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)
    }
}

#[async_trait]
impl SchemaCatalog for PgCatalog {
    async fn table_exists(&self, table: &str) -> DatabaseResult<bool> {
        self.exists(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
            &[table],
        )
        .await
    }

    async fn column_exists(&self, table: &str, column: &str) -> DatabaseResult<bool> {
        self.exists(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND column_name = $2
            )
            "#,
            &[table, column],
        )
        .await
    }

    async fn constraint_exists(&self, table: &str, name: &str) -> DatabaseResult<bool> {
        self.exists(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.table_constraints
                WHERE table_schema = current_schema()
                  AND table_name = $1
                  AND constraint_name = $2
            )
            "#,
            &[table, name],
        )
        .await
    }

    async fn index_exists(&self, name: &str) -> DatabaseResult<bool> {
        self.exists(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM pg_indexes
                WHERE schemaname = current_schema() AND indexname = $1
            )
            "#,
            &[name],
        )
        .await
    }

    async fn apply(&self, statement: &Statement) -> DatabaseResult<()> {
        let sql = statement.to_sql();
        sqlx::raw_sql(&sql)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        Ok(())
    }
}

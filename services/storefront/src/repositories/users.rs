//! User repository for database operations

use sqlx::PgPool;
use tracing::info;

use crate::models::{NewUser, Role, User};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, role, created_at";

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
    }

    /// Insert a user; a duplicate e-mail surfaces as a unique violation
    pub async fn create(&self, new_user: &NewUser) -> sqlx::Result<User> {
        info!("Creating user: {}", new_user.email);

        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (first_name, last_name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role.as_str())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn find_by_email(&self, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn find_by_id(&self, id: i32) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Update the given profile fields, leaving `None` fields unchanged
    pub async fn update_profile(
        &self,
        id: i32,
        first_name: Option<&str>,
        last_name: Option<&str>,
        email: Option<&str>,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET first_name = COALESCE($1, first_name),
                last_name = COALESCE($2, last_name),
                email = COALESCE($3, email)
            WHERE id = $4
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn update_password(&self, id: i32, password_hash: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set the role and display name of an existing user
    pub async fn promote(
        &self,
        id: i32,
        role: Role,
        first_name: &str,
        last_name: &str,
    ) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET role = $1, first_name = $2, last_name = $3 WHERE id = $4")
            .bind(role.as_str())
            .bind(first_name)
            .bind(last_name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

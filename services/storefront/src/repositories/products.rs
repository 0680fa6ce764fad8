//! Product repository

use sqlx::PgPool;

use crate::models::{NewProduct, Product, ProductUpdate, SearchParams};

// NUMERIC prices are read back as float8 for the JSON layer.
const PRODUCT_COLUMNS: &str =
    "id, name, price::float8 AS price, condition, specs, image_url, category, created_at";

/// Product repository
#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> sqlx::Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
    }

    /// All products, newest id first
    pub async fn list(&self) -> sqlx::Result<Vec<Product>> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id DESC"
        ))
        .fetch_all(&self.pool)
        .await
    }

    pub async fn create(&self, product: &NewProduct) -> sqlx::Result<Product> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (name, price, condition, specs, image_url, category)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(product.price)
        .bind(&product.condition)
        .bind(&product.specs)
        .bind(product.image_url.as_deref())
        .bind(&product.category)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update(&self, id: i32, update: &ProductUpdate) -> sqlx::Result<Option<Product>> {
        sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = COALESCE($1, name),
                price = COALESCE($2::float8::numeric, price),
                condition = COALESCE($3, condition),
                specs = COALESCE($4, specs),
                image_url = COALESCE($5, image_url),
                category = COALESCE($6, category)
            WHERE id = $7
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(update.name.as_deref())
        .bind(update.price)
        .bind(update.condition.as_deref())
        .bind(update.specs.as_deref())
        .bind(update.image_url.as_deref())
        .bind(update.category.as_deref())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete a product, returning the number of rows removed
    pub async fn delete(&self, id: i32) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// One page of products matching `params`, with the total match count
    pub async fn search(&self, params: &SearchParams) -> sqlx::Result<(Vec<Product>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE ($1::text IS NULL OR category = $1)",
        )
        .bind(params.category.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE ($1::text IS NULL OR category = $1)
            ORDER BY {}
            LIMIT $2 OFFSET $3
            "#,
            params.sort.order_by()
        ))
        .bind(params.category.as_deref())
        .bind(params.page_size)
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((items, total))
    }
}

//! Product catalog repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use florist_core::catalog::Product;
use florist_core::{Pagination, ProductId};

use super::{RepositoryError, count_to_total};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    slug: String,
    name: String,
    description: String,
    price: Decimal,
    category: String,
    tags: Vec<String>,
    image_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            price: row.price,
            category: row.category,
            tags: row.tags,
            image_url: row.image_url,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

const PRODUCT_COLUMNS: &str =
    "id, slug, name, description, price, category, tags, image_url, is_active, created_at";

/// Repository for catalog queries.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(Product::from))
    }

    /// Get an active product by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1 AND is_active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    /// Get several products by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Every active product, used to fill the search cache.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active ORDER BY name"
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// One page of active products, optionally restricted to a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_page(
        &self,
        category: Option<&str>,
        pagination: Pagination,
    ) -> Result<(Vec<Product>, u64), RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            r"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE is_active AND ($1::text IS NULL OR lower(category) = lower($1))
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(category)
        .bind(pagination.sql_limit())
        .bind(pagination.sql_offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM products
            WHERE is_active AND ($1::text IS NULL OR lower(category) = lower($1))
            ",
        )
        .bind(category)
        .fetch_one(self.pool)
        .await?;

        Ok((
            rows.into_iter().map(Product::from).collect(),
            count_to_total(total),
        ))
    }
}

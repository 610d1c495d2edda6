//! Catalog queries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use print_shop_core::{Money, ProductId};

use super::{PgStore, RepositoryError, map_unique_violation};
use crate::models::{Product, ProductFilter, ProductInput};
use crate::store::Catalog;

const PRODUCT_COLUMNS: &str = "id, name, slug, description, price, stock, category, visible, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    slug: String,
    description: String,
    price: Money,
    stock: i32,
    category: String,
    visible: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let stock = u32::try_from(row.stock).map_err(|_| {
            RepositoryError::DataCorruption(format!("negative stock for product {}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            stock,
            category: row.category,
            visible: row.visible,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Stock as stored. Callers reject values above [`crate::models::MAX_STOCK`];
/// anything larger is clamped rather than wrapped.
pub(super) fn stock_to_db(stock: u32) -> i32 {
    i32::try_from(stock).unwrap_or(i32::MAX)
}

// =============================================================================
// Repository
// =============================================================================

#[async_trait]
impl Catalog for PgStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product \
             WHERE ($1 = FALSE OR visible) AND ($2::TEXT IS NULL OR category = $2) \
             ORDER BY name"
        ))
        .bind(filter.visible_only)
        .bind(filter.category.as_deref())
        .fetch_all(&self.pool)
        .await?;

        into_products(rows)
    }

    async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM product \
             WHERE visible AND category <> '' ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let uuids: Vec<uuid::Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product WHERE id = ANY($1)"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;

        into_products(rows)
    }

    async fn create_product(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO product (id, name, slug, description, price, stock, category, visible) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(ProductId::generate())
        .bind(&input.name)
        .bind(input.resolved_slug())
        .bind(&input.description)
        .bind(input.price)
        .bind(stock_to_db(input.stock))
        .bind(&input.category)
        .bind(input.visible)
        .fetch_one(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        Product::try_from(row)
    }

    async fn update_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE product SET name = $2, slug = $3, description = $4, price = $5, \
             stock = $6, category = $7, visible = $8, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.name)
        .bind(input.resolved_slug())
        .bind(&input.description)
        .bind(input.price)
        .bind(stock_to_db(input.stock))
        .bind(&input.category)
        .bind(input.visible)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?
        .ok_or(RepositoryError::NotFound)?;

        Product::try_from(row)
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM product WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn low_stock(
        &self,
        threshold: u32,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product \
             WHERE visible AND stock < $1 \
             ORDER BY stock, name \
             LIMIT $2"
        ))
        .bind(stock_to_db(threshold))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        into_products(rows)
    }

    async fn product_count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product")
            .fetch_one(&self.pool)
            .await?;
        u64::try_from(count)
            .map_err(|_| RepositoryError::DataCorruption(format!("negative product count {count}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_to_db_clamps() {
        assert_eq!(stock_to_db(7), 7);
        assert_eq!(stock_to_db(u32::MAX), i32::MAX);
    }
}

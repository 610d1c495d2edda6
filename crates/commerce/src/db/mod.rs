//! `PostgreSQL` implementations of the store traits.
//!
//! ## Tables
//!
//! - `product` - Catalog, including the authoritative `stock` counter
//! - `orders` - Orders (`order_number` and `payment_reference` unique)
//! - `order_item` - Immutable line snapshots; `product_id` is `ON DELETE SET NULL`
//! - `shop_settings` - Singleton row of shop-wide settings
//!
//! # Migrations
//!
//! Migrations are stored in `crates/commerce/migrations/` and run via:
//! ```bash
//! cargo run -p print-shop-cli -- migrate
//! ```
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate compiles
//! without a live database.

mod orders;
mod products;
mod settings;
mod stock;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use crate::error::ErrorKind;

/// Embedded migrations for the commerce schema.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Unique constraint on `orders.order_number`.
pub const ORDER_NUMBER_KEY: &str = "orders_order_number_key";
/// Unique constraint on `orders.payment_reference`.
pub const PAYMENT_REFERENCE_KEY: &str = "orders_payment_reference_key";
/// Unique constraint on `product.slug`.
pub const PRODUCT_SLUG_KEY: &str = "product_slug_key";

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation, carrying the constraint name.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Whether this is a violation of the named unique constraint.
    #[must_use]
    pub fn is_conflict_on(&self, constraint: &str) -> bool {
        matches!(self, Self::Conflict(name) if name == constraint)
    }

    /// Error class for HTTP mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Validation,
            Self::Database(_) | Self::DataCorruption(_) => ErrorKind::Internal,
        }
    }
}

/// Map unique violations to [`RepositoryError::Conflict`] with the constraint name.
pub(crate) fn map_unique_violation(err: sqlx::Error) -> RepositoryError {
    let constraint = match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.constraint().unwrap_or("unique").to_string())
        }
        _ => None,
    };
    match constraint {
        Some(name) => RepositoryError::Conflict(name),
        None => RepositoryError::Database(err),
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// `PostgreSQL`-backed catalog, order and settings store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for health checks.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_matching() {
        let err = RepositoryError::Conflict(ORDER_NUMBER_KEY.to_string());
        assert!(err.is_conflict_on(ORDER_NUMBER_KEY));
        assert!(!err.is_conflict_on(PAYMENT_REFERENCE_KEY));
        assert!(!RepositoryError::NotFound.is_conflict_on(ORDER_NUMBER_KEY));
    }

    #[test]
    fn test_kinds() {
        assert_eq!(RepositoryError::NotFound.kind(), ErrorKind::NotFound);
        assert_eq!(
            RepositoryError::DataCorruption("bad".to_string()).kind(),
            ErrorKind::Internal
        );
    }
}

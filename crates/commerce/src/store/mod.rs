//! Store traits for the catalog, orders and shop settings.
//!
//! Services only see these traits. [`crate::db::PgStore`] implements them on
//! `PostgreSQL`; [`MemoryStore`] implements them on concurrent hash maps for
//! tests and local runs.
//!
//! The key operation is [`OrderStore::apply_transition`]: a compare-and-set
//! on the order's status that, when it wins, applies the plan's flag updates
//! and stock movements in the same atomic unit. Exactly one of any number of
//! concurrent callers holding the same plan gets [`TransitionOutcome::Applied`].

mod memory;

use async_trait::async_trait;

use print_shop_core::{OrderId, OrderNumber, OrderStatus, ProductId, TransitionPlan};

pub use crate::db::RepositoryError;
use crate::ledger::StockReport;
use crate::models::{
    NewOrder, Order, OrderStats, Product, ProductFilter, ProductInput, ShopSettings,
};
pub use memory::MemoryStore;

/// Product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Products matching the filter, ordered by name.
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError>;

    /// Distinct non-empty categories of visible products, sorted.
    async fn categories(&self) -> Result<Vec<String>, RepositoryError>;

    /// Look up one product.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Look up several products; missing ids are simply absent from the result.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Create a product. Fails with `Conflict` on a duplicate slug.
    async fn create_product(&self, input: &ProductInput) -> Result<Product, RepositoryError>;

    /// Replace a product's editable fields, including an absolute stock level.
    async fn update_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError>;

    /// Delete a product. Order items keep their snapshot and lose the link.
    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError>;

    /// Visible products with `stock < threshold`, lowest first, at most `limit`.
    async fn low_stock(&self, threshold: u32, limit: usize)
    -> Result<Vec<Product>, RepositoryError>;

    /// Number of products, hidden ones included.
    async fn product_count(&self) -> Result<u64, RepositoryError>;
}

/// Result of [`OrderStore::apply_transition`].
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The status matched `plan.from` and the move was committed.
    Applied {
        /// The order after the move.
        order: Order,
        /// Stock changes made in the same unit.
        stock: StockReport,
    },
    /// The status no longer matched `plan.from`; nothing changed.
    Stale(Order),
}

/// Durable order records.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new `PENDING` order and all of its items atomically.
    ///
    /// Fails with `Conflict(ORDER_NUMBER_KEY)` if the order number is taken.
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Set the payment reference of a `PENDING` order that has none yet.
    ///
    /// Fails with `Conflict` if the reference is already set, the order is no
    /// longer `PENDING`, or the reference belongs to another order.
    async fn attach_payment_reference(
        &self,
        id: OrderId,
        reference: &str,
    ) -> Result<Order, RepositoryError>;

    /// Look up an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Look up an order by its customer-facing number.
    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError>;

    /// Look up an order by payment intent id.
    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Orders, newest first, optionally restricted to one status.
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, RepositoryError>;

    /// Compare-and-set the order's status from `plan.from` to `plan.to`.
    ///
    /// On success the plan's stock movement and notification flags are
    /// applied in the same unit. Fails with `NotFound` for an unknown order.
    async fn apply_transition(
        &self,
        id: OrderId,
        plan: &TransitionPlan,
    ) -> Result<TransitionOutcome, RepositoryError>;

    /// Dashboard aggregates.
    async fn stats(&self) -> Result<OrderStats, RepositoryError>;
}

/// Shop settings singleton.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Current settings; defaults if none were saved.
    async fn get_settings(&self) -> Result<ShopSettings, RepositoryError>;

    /// Replace the settings.
    async fn update_settings(&self, settings: &ShopSettings) -> Result<(), RepositoryError>;
}

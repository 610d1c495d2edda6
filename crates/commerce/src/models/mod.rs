//! Domain models for the catalog, orders and shop settings.
//!
//! These are validated domain objects; database row types live in [`crate::db`].

pub mod order;
pub mod product;
pub mod settings;

pub use order::{CustomerDetails, NewOrder, NewOrderItem, Order, OrderItem, OrderStats};
pub use product::{MAX_STOCK, Product, ProductFilter, ProductInput, slugify};
pub use settings::ShopSettings;

//! Orders and their line items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use print_shop_core::{
    Currency, Email, Money, OrderId, OrderItemId, OrderNumber, OrderStatus, ProductId,
};

/// Customer contact and shipping details.
///
/// The address is kept as an opaque JSON object; nothing in the order
/// lifecycle inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDetails {
    /// Customer's full name.
    pub name: String,
    /// Customer's email address, used for notifications.
    pub email: Email,
    /// Shipping address.
    #[serde(default = "empty_address")]
    pub address: serde_json::Value,
}

fn empty_address() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    /// Unique order ID.
    pub id: OrderId,
    /// Customer-facing order number.
    pub order_number: OrderNumber,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Customer details.
    pub customer: CustomerDetails,
    /// Currency the order was placed in.
    pub currency: Currency,
    /// Sum of line totals.
    pub subtotal: Money,
    /// Flat shipping fee at checkout time.
    pub shipping_cost: Money,
    /// `subtotal + shipping_cost`, fixed at creation.
    pub total: Money,
    /// Payment intent ID, set once after checkout.
    pub payment_reference: Option<String>,
    /// Confirmation email has been dispatched.
    pub confirmation_sent: bool,
    /// Shipping email has been dispatched.
    pub shipping_notified: bool,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
    /// Line items, in cart order.
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Materialize a new order as stored, in `PENDING` with no payment reference.
    #[must_use]
    pub fn from_new(new: &NewOrder, now: DateTime<Utc>) -> Self {
        let items = new
            .items
            .iter()
            .map(|item| OrderItem {
                id: OrderItemId::generate(),
                order_id: new.id,
                product_id: Some(item.product_id),
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                price_at_time: item.price_at_time,
            })
            .collect();

        Self {
            id: new.id,
            order_number: new.order_number.clone(),
            status: OrderStatus::Pending,
            customer: new.customer.clone(),
            currency: new.currency.clone(),
            subtotal: new.subtotal,
            shipping_cost: new.shipping_cost,
            total: new.total,
            payment_reference: None,
            confirmation_sent: false,
            shipping_notified: false,
            created_at: now,
            updated_at: now,
            items,
        }
    }

    /// Total formatted in the order's currency.
    #[must_use]
    pub fn display_total(&self) -> String {
        self.total.display(&self.currency)
    }
}

/// An immutable snapshot of one purchased product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    /// Unique item ID.
    pub id: OrderItemId,
    /// Owning order.
    pub order_id: OrderId,
    /// Originating product; `None` once the product has been deleted.
    pub product_id: Option<ProductId>,
    /// Product name at purchase time.
    pub product_name: String,
    /// Quantity purchased.
    pub quantity: u32,
    /// Unit price at purchase time.
    pub price_at_time: Money,
}

impl OrderItem {
    /// `price_at_time * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.price_at_time
            .checked_mul(self.quantity)
            .unwrap_or(Money::ZERO)
    }
}

/// A validated order ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Pre-generated order ID.
    pub id: OrderId,
    /// Order number; regenerated by checkout on collision.
    pub order_number: OrderNumber,
    /// Customer details.
    pub customer: CustomerDetails,
    /// Currency.
    pub currency: Currency,
    /// Sum of line totals.
    pub subtotal: Money,
    /// Flat shipping fee.
    pub shipping_cost: Money,
    /// `subtotal + shipping_cost`.
    pub total: Money,
    /// Line items.
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Build an order from snapshotted lines, computing the totals.
    ///
    /// Returns `None` if any amount overflows.
    #[must_use]
    pub fn new(
        customer: CustomerDetails,
        currency: Currency,
        shipping_cost: Money,
        items: Vec<NewOrderItem>,
    ) -> Option<Self> {
        let mut subtotal = Money::ZERO;
        for item in &items {
            subtotal = subtotal.checked_add(item.price_at_time.checked_mul(item.quantity)?)?;
        }
        let total = subtotal.checked_add(shipping_cost)?;

        Some(Self {
            id: OrderId::generate(),
            order_number: OrderNumber::generate(),
            customer,
            currency,
            subtotal,
            shipping_cost,
            total,
            items,
        })
    }
}

/// A line of a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    /// Product being purchased.
    pub product_id: ProductId,
    /// Product name snapshot.
    pub product_name: String,
    /// Quantity (at least 1).
    pub quantity: u32,
    /// Unit price snapshot.
    pub price_at_time: Money,
}

/// Aggregate order numbers for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    /// Sum of totals over orders that took payment.
    pub revenue: Money,
    /// All orders.
    pub order_count: u64,
    /// Orders still awaiting payment.
    pub pending_count: u64,
}

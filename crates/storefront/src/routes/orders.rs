//! Customer-facing order lookup by order number.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use print_shop_commerce::models::{Order, OrderItem};
use print_shop_core::{Currency, Money, OrderNumber, OrderStatus};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Public view of an order. Omits the email, address and payment reference.
#[derive(Debug, Serialize)]
pub struct OrderView {
    order_number: OrderNumber,
    status: OrderStatus,
    customer_name: String,
    currency: Currency,
    subtotal: Money,
    shipping_cost: Money,
    total: Money,
    created_at: DateTime<Utc>,
    items: Vec<OrderItemView>,
}

#[derive(Debug, Serialize)]
struct OrderItemView {
    product_name: String,
    quantity: u32,
    price_at_time: Money,
    line_total: Money,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            price_at_time: item.price_at_time,
            line_total: item.line_total(),
        }
    }
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            items: order.items.iter().map(OrderItemView::from).collect(),
            order_number: order.order_number,
            status: order.status,
            customer_name: order.customer.name,
            currency: order.currency,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            total: order.total,
            created_at: order.created_at,
        }
    }
}

/// Look up an order by its number.
pub async fn show(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<OrderView>> {
    let not_found = || AppError::NotFound(format!("order {order_number}"));
    let number = OrderNumber::parse(&order_number).map_err(|_| not_found())?;
    let order = state
        .orders()
        .find_by_number(&number)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(order.into()))
}

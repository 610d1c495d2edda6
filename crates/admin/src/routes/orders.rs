//! Order listing, status changes and refunds.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use print_shop_commerce::models::Order;
use print_shop_commerce::services::TransitionReport;
use print_shop_core::{OrderId, OrderStatus};

use crate::error::{AppError, Result};
use crate::middleware::RequireOperator;
use crate::routes::ApiJson;
use crate::state::AppState;

/// Query string for `GET /api/orders`.
#[derive(Debug, Deserialize)]
pub struct OrderQuery {
    /// Restrict to one status; empty means all.
    pub status: Option<String>,
}

/// Body of `POST /api/orders/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    /// Requested status.
    pub status: OrderStatus,
}

fn parse_id(raw: &str) -> Result<OrderId> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("order {raw}")))
}

/// Orders, newest first.
pub async fn list(
    _: RequireOperator,
    State(state): State<AppState>,
    Query(query): Query<OrderQuery>,
) -> Result<Json<Vec<Order>>> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<OrderStatus>().map_err(AppError::BadRequest)?),
    };
    Ok(Json(state.orders().list_orders(status).await?))
}

/// One order with its items.
pub async fn show(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    let order_id = parse_id(&id)?;
    let order = state
        .orders()
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {id}")))?;
    Ok(Json(order))
}

/// Move an order to the requested status.
pub async fn update_status(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> Result<Json<TransitionReport>> {
    let order_id = parse_id(&id)?;
    let shop = state.settings().get_settings().await?;
    let report = state
        .transitions()
        .set_status(order_id, update.status, &shop)
        .await?;

    tracing::info!(
        order_id = %order_id,
        status = %report.order.status,
        changed = report.changed,
        "Order status updated"
    );
    Ok(Json(report))
}

/// Refund a paid order.
pub async fn refund(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TransitionReport>> {
    let order_id = parse_id(&id)?;
    let shop = state.settings().get_settings().await?;
    let report = state.transitions().refund(order_id, &shop).await?;

    tracing::info!(order_id = %order_id, "Order refunded");
    Ok(Json(report))
}

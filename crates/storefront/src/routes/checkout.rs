//! Checkout and payment retry.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use print_shop_commerce::services::{CheckoutReceipt, CheckoutRequest};
use print_shop_core::OrderNumber;

use super::ApiJson;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create a `PENDING` order and its payment intent.
///
/// Settings are read once here and passed down.
pub async fn create(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutReceipt>)> {
    let shop = state.settings().get_settings().await?;
    let receipt = state.checkout().checkout(request, &shop).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Start payment again for an order whose intent could not be created.
pub async fn retry(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<CheckoutReceipt>> {
    let order_number = OrderNumber::parse(&order_number)
        .map_err(|_| AppError::NotFound(format!("order {order_number}")))?;
    Ok(Json(state.checkout().retry_payment(&order_number).await?))
}

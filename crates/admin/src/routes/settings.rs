//! Shop settings.

use axum::{Json, extract::State};

use print_shop_commerce::models::ShopSettings;
use print_shop_core::Money;

use crate::error::{AppError, Result};
use crate::middleware::RequireOperator;
use crate::routes::ApiJson;
use crate::state::AppState;

/// Current settings.
pub async fn show(_: RequireOperator, State(state): State<AppState>) -> Result<Json<ShopSettings>> {
    Ok(Json(state.settings().get_settings().await?))
}

/// Replace the settings. Applies to orders created afterwards.
pub async fn update(
    _: RequireOperator,
    State(state): State<AppState>,
    ApiJson(settings): ApiJson<ShopSettings>,
) -> Result<Json<ShopSettings>> {
    if settings.shop_name.trim().is_empty() {
        return Err(AppError::BadRequest("shop_name must not be empty".to_owned()));
    }
    if settings.shipping_fee < Money::ZERO {
        return Err(AppError::BadRequest(
            "shipping_fee must not be negative".to_owned(),
        ));
    }

    state.settings().update_settings(&settings).await?;
    tracing::info!(
        shop_name = %settings.shop_name,
        currency = %settings.currency,
        shipping_fee = settings.shipping_fee.minor(),
        "Shop settings updated"
    );
    Ok(Json(settings))
}

//! Dashboard summary.

use axum::{Json, extract::State};
use serde::Serialize;

use print_shop_commerce::models::{OrderStats, Product};

use crate::error::Result;
use crate::middleware::RequireOperator;
use crate::state::AppState;

/// Visible products below this stock level are flagged.
pub const LOW_STOCK_THRESHOLD: u32 = 5;

/// Most low-stock products listed.
pub const LOW_STOCK_LIMIT: usize = 10;

/// Dashboard response.
#[derive(Debug, Serialize)]
pub struct Dashboard {
    stats: OrderStats,
    product_count: u64,
    low_stock: Vec<Product>,
}

/// Revenue, order and product counts, and low-stock products.
pub async fn show(_: RequireOperator, State(state): State<AppState>) -> Result<Json<Dashboard>> {
    let stats = state.orders().stats().await?;
    let product_count = state.catalog().product_count().await?;
    let low_stock = state
        .catalog()
        .low_stock(LOW_STOCK_THRESHOLD, LOW_STOCK_LIMIT)
        .await?;
    Ok(Json(Dashboard {
        stats,
        product_count,
        low_stock,
    }))
}

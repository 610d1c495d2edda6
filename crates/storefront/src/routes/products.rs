//! Catalog JSON for the storefront pages.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use print_shop_commerce::models::{Product, ProductFilter};

use crate::error::Result;
use crate::state::AppState;

/// Query string for `GET /api/products`.
#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    /// Restrict to one category.
    pub category: Option<String>,
}

/// Visible products, optionally in one category.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>> {
    let filter = ProductFilter::storefront(query.category);
    Ok(Json(state.catalog().list_products(&filter).await?))
}

/// Distinct categories of visible products.
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.catalog().categories().await?))
}

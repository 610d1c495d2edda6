//! Catalog management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use print_shop_commerce::models::{MAX_STOCK, Product, ProductFilter, ProductInput};
use print_shop_core::{Money, ProductId};

use crate::error::{AppError, Result};
use crate::middleware::RequireOperator;
use crate::routes::ApiJson;
use crate::state::AppState;

fn parse_id(raw: &str) -> Result<ProductId> {
    raw.parse()
        .map_err(|_| AppError::NotFound(format!("product {raw}")))
}

fn validate(input: &ProductInput) -> Result<()> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_owned()));
    }
    if input.price < Money::ZERO {
        return Err(AppError::BadRequest("price must not be negative".to_owned()));
    }
    if input.stock > MAX_STOCK {
        return Err(AppError::BadRequest(format!(
            "stock must not exceed {MAX_STOCK}"
        )));
    }
    if input.resolved_slug().is_empty() {
        return Err(AppError::BadRequest(
            "slug must contain a letter or digit".to_owned(),
        ));
    }
    Ok(())
}

/// All products, hidden ones included.
pub async fn list(_: RequireOperator, State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(
        state
            .catalog()
            .list_products(&ProductFilter::default())
            .await?,
    ))
}

/// Create a product.
pub async fn create(
    _: RequireOperator,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ProductInput>,
) -> Result<(StatusCode, Json<Product>)> {
    validate(&input)?;
    let product = state.catalog().create_product(&input).await?;
    tracing::info!(product_id = %product.id, slug = %product.slug, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

/// One product.
pub async fn show(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>> {
    let product = state
        .catalog()
        .get_product(parse_id(&id)?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;
    Ok(Json(product))
}

/// Replace a product's fields. `stock` is an absolute level.
pub async fn update(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<ProductInput>,
) -> Result<Json<Product>> {
    let product_id = parse_id(&id)?;
    validate(&input)?;
    let product = state.catalog().update_product(product_id, &input).await?;
    tracing::info!(product_id = %product.id, stock = product.stock, "Product updated");
    Ok(Json(product))
}

/// Delete a product. Past orders keep their item snapshots.
pub async fn delete(
    _: RequireOperator,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let product_id = parse_id(&id)?;
    state.catalog().delete_product(product_id).await?;
    tracing::info!(product_id = %product_id, "Product deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input(name: &str, price: i64) -> ProductInput {
        serde_json::from_value(serde_json::json!({ "name": name, "price": price })).unwrap()
    }

    #[test]
    fn test_validate() {
        assert!(validate(&input("Phone Stand", 1299)).is_ok());
        assert!(validate(&input("Free Sample", 0)).is_ok());
        assert!(validate(&input("   ", 1299)).is_err());
        assert!(validate(&input("Phone Stand", -1)).is_err());
        assert!(validate(&input("!!!", 100)).is_err());

        let mut stocked = input("Phone Stand", 1299);
        stocked.stock = MAX_STOCK;
        assert!(validate(&stocked).is_ok());
        stocked.stock = MAX_STOCK + 1;
        assert!(matches!(validate(&stocked), Err(AppError::BadRequest(_))));
    }
}

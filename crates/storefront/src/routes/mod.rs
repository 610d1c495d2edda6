//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                               - Liveness
//! GET  /health/ready                         - Readiness (database ping)
//!
//! # Catalog
//! GET  /api/products?category=               - Visible products
//! GET  /api/categories                       - Distinct categories
//!
//! # Checkout
//! POST /api/checkout                         - Create order + payment intent
//! POST /api/checkout/{order_number}/retry    - New intent for a stranded order
//! GET  /api/orders/{order_number}            - Customer order lookup
//!
//! # Payment gateway
//! POST /api/stripe/webhook                   - Signed payment events
//! ```

pub mod checkout;
pub mod health;
pub mod orders;
pub mod products;
pub mod webhook;

use axum::{
    Router,
    extract::FromRequest,
    routing::{get, post},
};

use crate::error::AppError;
use crate::state::AppState;

/// JSON body extractor whose rejections render as [`AppError::BadRequest`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Build the storefront routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/api/products", get(products::list))
        .route("/api/categories", get(products::categories))
        .route("/api/checkout", post(checkout::create))
        .route("/api/checkout/{order_number}/retry", post(checkout::retry))
        .route("/api/orders/{order_number}", get(orders::show))
        .route("/api/stripe/webhook", post(webhook::receive))
}

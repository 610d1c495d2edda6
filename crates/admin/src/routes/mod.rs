//! HTTP route handlers for the admin API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                     - Liveness
//! GET    /health/ready               - Readiness (database ping)
//!
//! # Everything below requires `Authorization: Bearer <ADMIN_API_TOKEN>`
//! GET    /api/dashboard              - Revenue, counts, low stock
//!
//! # Orders
//! GET    /api/orders?status=         - Orders, newest first
//! GET    /api/orders/{id}            - Order with items
//! POST   /api/orders/{id}/status     - Cancel, ship or deliver
//! POST   /api/orders/{id}/refund     - Gateway refund + stock restore
//!
//! # Catalog
//! GET    /api/products               - All products, hidden included
//! POST   /api/products               - Create
//! GET    /api/products/{id}          - Show
//! PUT    /api/products/{id}          - Replace (absolute stock)
//! DELETE /api/products/{id}          - Delete
//!
//! # Settings
//! GET    /api/settings               - Shop settings
//! PUT    /api/settings               - Replace shop settings
//! ```

pub mod dashboard;
pub mod health;
pub mod orders;
pub mod products;
pub mod settings;

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

/// Build the admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/api/dashboard", get(dashboard::show))
        .route("/api/orders", get(orders::list))
        .route("/api/orders/{id}", get(orders::show))
        .route("/api/orders/{id}/status", post(orders::update_status))
        .route("/api/orders/{id}/refund", post(orders::refund))
        .route("/api/products", get(products::list).post(products::create))
        .route(
            "/api/products/{id}",
            get(products::show)
                .put(products::update)
                .delete(products::delete),
        )
        .route("/api/settings", get(settings::show).put(settings::update))
}

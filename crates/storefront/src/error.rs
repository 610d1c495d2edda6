//! Unified error handling with Sentry integration.
//!
//! Handlers return `Result<T, AppError>`. Each commerce error reports its
//! class through `kind()`; the class picks the status code. Internal errors
//! are captured to Sentry and their details hidden from clients.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use print_shop_commerce::ErrorKind;
use print_shop_commerce::services::{CheckoutError, WebhookError};
use print_shop_commerce::store::RepositoryError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Checkout or payment retry failed.
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    /// Webhook delivery rejected or failed.
    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// Database operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl AppError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Checkout(e) => e.kind(),
            Self::Webhook(e) => e.kind(),
            Self::Repository(e) => e.kind(),
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadRequest(_) => ErrorKind::Validation,
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => match self {
                Self::Checkout(CheckoutError::OutOfStock { .. } | CheckoutError::NotRetryable { .. })
                | Self::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            },
            ErrorKind::Integrity => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Gateway => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        // Capture server errors to Sentry
        if matches!(kind, ErrorKind::Internal | ErrorKind::Gateway) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match kind {
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let mut body = json!({ "error": message, "kind": kind });
        if let Self::Checkout(CheckoutError::Gateway { order_number, .. }) = &self {
            body["order_number"] = json!(order_number);
        }

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

//! Unified error handling for admin.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use print_shop_commerce::ErrorKind;
use print_shop_commerce::services::TransitionError;
use print_shop_commerce::store::RepositoryError;

/// Application-level error type for the admin API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Status change or refund failed.
    #[error(transparent)]
    Transition(#[from] TransitionError),

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
            Self::Transition(e) => e.kind(),
            Self::Repository(e) => e.kind(),
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::BadRequest(_) => ErrorKind::Validation,
        }
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => match self {
                Self::BadRequest(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::CONFLICT,
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

        (self.status(), Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use print_shop_commerce::payments::GatewayError;
    use print_shop_core::{InvalidTransition, OrderStatus};

    #[test]
    fn test_status_mapping() {
        let invalid = AppError::from(TransitionError::InvalidTransition(InvalidTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Paid,
        }));
        assert_eq!(invalid.status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(TransitionError::Gateway(GatewayError::GatewayUnavailable(
                "503".to_owned()
            )))
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(TransitionError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(RepositoryError::Conflict("product_slug_key".to_owned())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::BadRequest("name".to_owned()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}

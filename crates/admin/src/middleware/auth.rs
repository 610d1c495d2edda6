//! Bearer-token authentication for operator routes.
//!
//! Every `/api` route takes [`RequireOperator`]. The token is compared by
//! SHA-256 digest so the comparison time does not depend on how much of the
//! presented token matches.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};

use crate::state::AppState;

/// Extractor that requires a valid operator token.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(_: RequireOperator) -> &'static str {
///     "ok"
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RequireOperator;

/// Rejection for missing or wrong credentials.
#[derive(Debug)]
pub struct Unauthorized;

impl IntoResponse for Unauthorized {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [("www-authenticate", "Bearer")],
            axum::Json(serde_json::json!({ "error": "Unauthorized" })),
        )
            .into_response()
    }
}

fn token_matches(presented: &str, expected: &str) -> bool {
    Sha256::digest(presented.as_bytes()) == Sha256::digest(expected.as_bytes())
}

impl FromRequestParts<AppState> for RequireOperator {
    type Rejection = Unauthorized;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(Unauthorized)?;

        if token_matches(presented, state.api_token().expose_secret()) {
            Ok(Self)
        } else {
            tracing::warn!(target: "security", path = %parts.uri.path(), "Rejected operator token");
            Err(Unauthorized)
        }
    }
}

//! Payment gateway webhook endpoint.
//!
//! The raw body is needed for signature verification, so it is taken as
//! bytes and handed to the reconciler unparsed.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use serde_json::{Value, json};

use print_shop_commerce::payments::signature::SIGNATURE_HEADER;

use crate::error::Result;
use crate::state::AppState;

/// Receive a signed event.
///
/// Any verified event is acknowledged with 200 once its state change is
/// committed, whatever happens to the notifications it queues. Rejected
/// signatures get 400; storage failures get 500 so the gateway redelivers.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let outcome = state
        .reconciler()
        .handle(&body, signature, state.settings())
        .await?;

    tracing::debug!(?outcome, "Webhook processed");
    Ok(Json(json!({ "received": true, "result": outcome })))
}

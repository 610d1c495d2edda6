//! Payment gateway adapter.
//!
//! The rest of the crate talks to the gateway only through [`PaymentGateway`]:
//! create an intent, verify and type a webhook payload, refund an intent.
//! [`StripeGateway`] is the production implementation.

pub mod signature;
mod stripe;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use print_shop_core::{Currency, Money};

use crate::error::ErrorKind;
pub use stripe::{StripeGateway, parse_event};

/// Errors from the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure, 5xx, or rate limiting.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway rejected the amount (zero, below minimum, too large).
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The intent has already been refunded.
    #[error("payment already refunded")]
    AlreadyRefunded,

    /// The gateway does not know the intent.
    #[error("no such payment intent: {0}")]
    NoSuchIntent(String),

    /// Webhook signature missing, stale, or wrong.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Webhook body is not a recognizable event.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The call did not complete within its deadline.
    #[error("payment gateway timed out after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// Error class for HTTP mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::GatewayUnavailable(_) | Self::NoSuchIntent(_) | Self::Timeout(_) => {
                ErrorKind::Gateway
            }
            Self::InvalidAmount(_) | Self::AlreadyRefunded => ErrorKind::Validation,
            Self::InvalidSignature(_) | Self::MalformedPayload(_) => ErrorKind::Integrity,
        }
    }
}

/// Request for a new payment intent.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    /// Amount in minor units.
    pub amount: Money,
    /// Currency.
    pub currency: Currency,
    /// Key/value pairs stored on the intent (order id and number).
    pub metadata: BTreeMap<String, String>,
}

/// A created payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentIntent {
    /// Gateway intent id; stored as the order's payment reference.
    pub id: String,
    /// Secret the browser uses to confirm the payment.
    pub client_secret: String,
}

/// A verified webhook event, typed at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// `payment_intent.succeeded`.
    PaymentSucceeded {
        /// Gateway event id.
        event_id: String,
        /// The paid intent.
        intent_id: String,
    },
    /// Any other event type; acknowledged and ignored.
    Other {
        /// Gateway event id.
        event_id: String,
        /// The event type as sent.
        event_type: String,
    },
}

impl GatewayEvent {
    /// Gateway event id.
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::PaymentSucceeded { event_id, .. } | Self::Other { event_id, .. } => event_id,
        }
    }
}

/// A refund issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundRecord {
    /// Gateway refund id.
    pub id: String,
    /// Refunded intent.
    pub intent_id: String,
    /// Refunded amount.
    pub amount: Money,
    /// Gateway-reported status, e.g. `succeeded` or `pending`.
    pub status: String,
}

/// Payment gateway capabilities used by the order lifecycle.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent.
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, GatewayError>;

    /// Verify a webhook signature and parse the payload into a typed event.
    ///
    /// Must not perform any I/O; a failure here ends processing of the event.
    fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, GatewayError>;

    /// Refund the full amount of a payment intent.
    async fn create_refund(&self, intent_id: &str) -> Result<RefundRecord, GatewayError>;
}

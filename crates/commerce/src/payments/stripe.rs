//! Stripe REST adapter.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, error, instrument, warn};

use print_shop_core::Money;

use super::{GatewayError, GatewayEvent, IntentRequest, PaymentGateway, PaymentIntent, RefundRecord};
use crate::config::{StripeConfig, WebhookConfig};

const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Stripe API client.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
    webhook: Option<WebhookConfig>,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("config", &self.config)
            .field("webhook", &self.webhook)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    payment_intent: Option<String>,
    amount: i64,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
    param: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: RawEventObject,
}

#[derive(Debug, Deserialize)]
struct RawEventObject {
    id: Option<String>,
}

impl StripeGateway {
    /// Create a client. `webhook` is only needed where events are received.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::GatewayUnavailable` if the HTTP client cannot be built.
    pub fn new(config: StripeConfig, webhook: Option<WebhookConfig>) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::GatewayUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            config,
            webhook,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.api_base.trim_end_matches('/'))
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
        subject: &str,
    ) -> Result<T, GatewayError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::GatewayUnavailable(format!("unreadable response: {e}")));
        }

        let api_error = response.json::<ErrorEnvelope>().await.ok().map(|env| env.error);
        Err(map_api_error(status, api_error, subject))
    }

    fn transport_error(&self, err: &reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.timeout)
        } else {
            GatewayError::GatewayUnavailable(err.to_string())
        }
    }
}

fn map_api_error(status: StatusCode, api_error: Option<ApiError>, subject: &str) -> GatewayError {
    let (code, param, message) = api_error.map_or((None, None, None), |e| (e.code, e.param, e.message));
    let message = message.unwrap_or_else(|| format!("HTTP {status}"));

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return GatewayError::GatewayUnavailable(message);
    }

    match code.as_deref() {
        Some("charge_already_refunded") => GatewayError::AlreadyRefunded,
        Some("resource_missing") => GatewayError::NoSuchIntent(subject.to_string()),
        Some("amount_too_small" | "amount_too_large") => GatewayError::InvalidAmount(message),
        _ if param.as_deref() == Some("amount") => GatewayError::InvalidAmount(message),
        _ => GatewayError::GatewayUnavailable(message),
    }
}

/// Parse a verified webhook payload into a typed event.
///
/// # Errors
///
/// Returns `GatewayError::MalformedPayload` if the body is not an event, or a
/// `payment_intent.succeeded` event carries no intent id.
pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

    if raw.event_type == PAYMENT_SUCCEEDED {
        let intent_id = raw
            .data
            .object
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| GatewayError::MalformedPayload("event object has no id".to_string()))?;
        Ok(GatewayEvent::PaymentSucceeded {
            event_id: raw.id,
            intent_id,
        })
    } else {
        Ok(GatewayEvent::Other {
            event_id: raw.id,
            event_type: raw.event_type,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(amount = request.amount.minor(), currency = %request.currency))]
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, GatewayError> {
        if !request.amount.is_positive() {
            return Err(GatewayError::InvalidAmount(format!(
                "amount must be positive (got {})",
                request.amount
            )));
        }

        let mut form = vec![
            ("amount".to_string(), request.amount.minor().to_string()),
            ("currency".to_string(), request.currency.code().to_string()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        form.extend(
            request
                .metadata
                .iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value.clone())),
        );

        let intent: IntentResponse = self
            .post_form("payment_intents", &form, "payment_intent")
            .await
            .inspect_err(|e| error!(error = %e, "Failed to create payment intent"))?;

        debug!(intent_id = %intent.id, "Payment intent created");
        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
        })
    }

    fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        let Some(webhook) = &self.webhook else {
            warn!("Webhook received but no signing secret is configured");
            return Err(GatewayError::InvalidSignature(
                "webhook secret not configured".to_string(),
            ));
        };

        super::signature::verify(
            payload,
            signature_header,
            webhook.secret.expose_secret().as_bytes(),
            webhook.tolerance,
            chrono::Utc::now().timestamp(),
        )?;

        parse_event(payload)
    }

    #[instrument(skip(self))]
    async fn create_refund(&self, intent_id: &str) -> Result<RefundRecord, GatewayError> {
        let form = vec![("payment_intent".to_string(), intent_id.to_string())];
        let refund: RefundResponse = self
            .post_form("refunds", &form, intent_id)
            .await
            .inspect_err(|e| error!(error = %e, "Failed to create refund"))?;

        debug!(refund_id = %refund.id, "Refund created");
        Ok(RefundRecord {
            id: refund.id,
            intent_id: refund.payment_intent.unwrap_or_else(|| intent_id.to_string()),
            amount: Money::from_minor(refund.amount),
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn api_error(code: Option<&str>, param: Option<&str>) -> Option<ApiError> {
        Some(ApiError {
            code: code.map(String::from),
            param: param.map(String::from),
            message: Some("boom".to_string()),
        })
    }

    #[test]
    fn test_parse_payment_succeeded() {
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_123","amount":2500}}}"#;
        assert_eq!(
            parse_event(payload).unwrap(),
            GatewayEvent::PaymentSucceeded {
                event_id: "evt_1".to_string(),
                intent_id: "pi_123".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_other_event() {
        let payload = br#"{"id":"evt_2","type":"charge.refunded","data":{"object":{"id":"ch_1"}}}"#;
        assert!(matches!(
            parse_event(payload).unwrap(),
            GatewayEvent::Other { event_type, .. } if event_type == "charge.refunded"
        ));
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_event(b"not json"),
            Err(GatewayError::MalformedPayload(_))
        ));
        let missing_id = br#"{"id":"evt_3","type":"payment_intent.succeeded","data":{"object":{}}}"#;
        assert!(matches!(
            parse_event(missing_id),
            Err(GatewayError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_api_error(StatusCode::BAD_REQUEST, api_error(Some("charge_already_refunded"), None), "pi_1"),
            GatewayError::AlreadyRefunded
        ));
        assert!(matches!(
            map_api_error(StatusCode::NOT_FOUND, api_error(Some("resource_missing"), None), "pi_1"),
            GatewayError::NoSuchIntent(id) if id == "pi_1"
        ));
        assert!(matches!(
            map_api_error(StatusCode::BAD_REQUEST, api_error(None, Some("amount")), "payment_intent"),
            GatewayError::InvalidAmount(_)
        ));
        assert!(matches!(
            map_api_error(StatusCode::SERVICE_UNAVAILABLE, None, "pi_1"),
            GatewayError::GatewayUnavailable(_)
        ));
    }
}

//! Fakes shared by the service unit tests.

#![allow(clippy::unwrap_used)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use print_shop_core::{Email, Money, ProductId};

use crate::models::{CustomerDetails, Product, ProductInput};
use crate::notifications::{Notification, Notifier};
use crate::payments::{
    GatewayError, GatewayEvent, IntentRequest, PaymentGateway, PaymentIntent, RefundRecord,
    parse_event,
};
use crate::store::{Catalog, MemoryStore};

pub const SIGNATURE: &str = "valid";

#[derive(Default)]
pub struct FakeGateway {
    pub intents: Mutex<Vec<IntentRequest>>,
    pub refunds: Mutex<Vec<String>>,
    pub fail_intent: Mutex<Option<GatewayError>>,
    pub fail_refund: Mutex<Option<GatewayError>>,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn intent_count(&self) -> usize {
        self.intents.lock().unwrap().len()
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, GatewayError> {
        if let Some(err) = self.fail_intent.lock().unwrap().take() {
            return Err(err);
        }
        self.intents.lock().unwrap().push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            id: format!("pi_{n}"),
            client_secret: format!("pi_{n}_secret"),
        })
    }

    fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        if signature_header != SIGNATURE {
            return Err(GatewayError::InvalidSignature("signature mismatch".to_owned()));
        }
        parse_event(payload)
    }

    async fn create_refund(&self, intent_id: &str) -> Result<RefundRecord, GatewayError> {
        if let Some(err) = self.fail_refund.lock().unwrap().take() {
            return Err(err);
        }
        self.refunds.lock().unwrap().push(intent_id.to_owned());
        Ok(RefundRecord {
            id: format!("re_{intent_id}"),
            intent_id: intent_id.to_owned(),
            amount: Money::ZERO,
            status: "succeeded".to_owned(),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(Notification::kind).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn dispatch(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

pub async fn product(store: &MemoryStore, name: &str, price: i64, stock: u32) -> Product {
    store
        .create_product(&ProductInput {
            name: name.to_owned(),
            slug: None,
            description: String::new(),
            price: Money::from_minor(price),
            stock,
            category: "Figurines".to_owned(),
            visible: true,
        })
        .await
        .unwrap()
}

pub async fn stock_of(store: &MemoryStore, id: ProductId) -> u32 {
    store.get_product(id).await.unwrap().unwrap().stock
}

pub fn customer() -> CustomerDetails {
    CustomerDetails {
        name: "Ada".to_owned(),
        email: Email::parse("ada@example.com").unwrap(),
        address: serde_json::json!({ "line1": "1 Analytical Way" }),
    }
}

pub fn succeeded(intent_id: &str) -> Vec<u8> {
    serde_json::json!({
        "id": format!("evt_{intent_id}"),
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id } }
    })
    .to_string()
    .into_bytes()
}

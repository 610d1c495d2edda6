//! Integration tests for Print Shop.
//!
//! Everything runs in process against [`MemoryStore`], a scriptable
//! [`FakeGateway`] and a [`RecordingNotifier`]; no database or network is
//! needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p print-shop-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout` - Cart validation, totals, order-number collisions, retry
//! - `webhook` - Signature checks, redelivery, oversold handling
//! - `transitions` - Operator status changes and refunds
//! - `concurrency` - Racing deliveries and operator actions
//! - `storefront_http` / `admin_http` - Routers driven with `tower::ServiceExt`

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use print_shop_commerce::config::OrderConfig;
use print_shop_commerce::db::ORDER_NUMBER_KEY;
use print_shop_commerce::models::{
    NewOrder, Order, OrderStats, Product, ProductInput, ShopSettings,
};
use print_shop_commerce::notifications::{Notification, Notifier};
use print_shop_commerce::payments::{
    GatewayError, GatewayEvent, IntentRequest, PaymentGateway, PaymentIntent, RefundRecord,
    parse_event, signature,
};
use print_shop_commerce::services::{
    CartLine, CheckoutReceipt, CheckoutRequest, CheckoutService, CustomerInput, ReconcileOutcome,
    TransitionService, WebhookReconciler,
};
use print_shop_commerce::store::{
    Catalog, MemoryStore, OrderStore, RepositoryError, SettingsStore, TransitionOutcome,
};
use print_shop_core::{Money, OrderId, OrderNumber, OrderStatus, ProductId, TransitionPlan};

/// Signing secret shared by [`FakeGateway`] and [`sign`].
pub const WEBHOOK_SECRET: &[u8] = b"whsec_k3Pq9ZxT7mV2rL8cW4nY";

/// Accepted signature age.
pub const WEBHOOK_TOLERANCE: Duration = Duration::from_secs(300);

/// Operator token accepted by [`TestShop::admin_router`].
pub const ADMIN_TOKEN: &str = "op_Zq8Lm3Xv7Rt2Wk9Pn4Hc6Jd1Bf5Gs0Ty";

// =============================================================================
// Webhook payloads
// =============================================================================

/// Sign a payload the way the gateway does, timestamped now.
#[must_use]
pub fn sign(payload: &[u8]) -> String {
    signature::sign(payload, WEBHOOK_SECRET, chrono::Utc::now().timestamp()).unwrap()
}

/// A `payment_intent.succeeded` event body.
#[must_use]
pub fn succeeded_event(intent_id: &str) -> Vec<u8> {
    serde_json::json!({
        "id": format!("evt_{intent_id}"),
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
    .to_string()
    .into_bytes()
}

/// An event type the reconciler ignores.
#[must_use]
pub fn other_event(event_type: &str) -> Vec<u8> {
    serde_json::json!({
        "id": "evt_other",
        "type": event_type,
        "data": { "object": { "id": "ch_1" } }
    })
    .to_string()
    .into_bytes()
}

// =============================================================================
// Fake gateway
// =============================================================================

/// Scriptable payment gateway.
///
/// Verifies real HMAC signatures with [`WEBHOOK_SECRET`]. Failures pushed
/// onto the queues are returned by the next calls, in order.
#[derive(Default)]
pub struct FakeGateway {
    intents: Mutex<Vec<IntentRequest>>,
    refunds: Mutex<Vec<String>>,
    intent_failures: Mutex<VecDeque<GatewayError>>,
    refund_failures: Mutex<VecDeque<GatewayError>>,
    refund_delay: Mutex<Option<Duration>>,
    refund_response_delay: Mutex<Option<Duration>>,
    counter: AtomicUsize,
}

impl FakeGateway {
    /// Fail the next intent call.
    pub fn fail_next_intent(&self, err: GatewayError) {
        self.intent_failures.lock().unwrap().push_back(err);
    }

    /// Fail the next refund call.
    pub fn fail_next_refund(&self, err: GatewayError) {
        self.refund_failures.lock().unwrap().push_back(err);
    }

    /// Make every refund call take this long.
    pub fn delay_refunds(&self, delay: Duration) {
        *self.refund_delay.lock().unwrap() = Some(delay);
    }

    /// Commit the next refund, then hold the response for `delay`.
    pub fn delay_next_refund_response(&self, delay: Duration) {
        *self.refund_response_delay.lock().unwrap() = Some(delay);
    }

    /// Intent requests received.
    #[must_use]
    pub fn intents(&self) -> Vec<IntentRequest> {
        self.intents.lock().unwrap().clone()
    }

    /// Intent ids refunded.
    #[must_use]
    pub fn refunds(&self) -> Vec<String> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, GatewayError> {
        if let Some(err) = self.intent_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        if !request.amount.is_positive() {
            return Err(GatewayError::InvalidAmount(request.amount.to_string()));
        }
        self.intents.lock().unwrap().push(request.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentIntent {
            id: format!("pi_test_{n}"),
            client_secret: format!("pi_test_{n}_secret_{n}"),
        })
    }

    fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        signature::verify(
            payload,
            signature_header,
            WEBHOOK_SECRET,
            WEBHOOK_TOLERANCE,
            chrono::Utc::now().timestamp(),
        )?;
        parse_event(payload)
    }

    async fn create_refund(&self, intent_id: &str) -> Result<RefundRecord, GatewayError> {
        let delay = *self.refund_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.refund_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        {
            let mut refunds = self.refunds.lock().unwrap();
            if refunds.iter().any(|id| id == intent_id) {
                return Err(GatewayError::AlreadyRefunded);
            }
            refunds.push(intent_id.to_owned());
        }

        let response_delay = self.refund_response_delay.lock().unwrap().take();
        if let Some(delay) = response_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(RefundRecord {
            id: format!("re_{intent_id}"),
            intent_id: intent_id.to_owned(),
            amount: Money::ZERO,
            status: "succeeded".to_owned(),
        })
    }
}

// =============================================================================
// Recording notifier
// =============================================================================

/// Notifier that keeps every dispatched notification.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Everything dispatched so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// How many notifications of one kind were dispatched.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.kind() == kind)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn dispatch(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

// =============================================================================
// Colliding order store
// =============================================================================

/// Order store whose first `collisions` inserts fail on the order-number index.
pub struct CollidingStore {
    inner: Arc<MemoryStore>,
    collisions: AtomicUsize,
    attempts: AtomicUsize,
}

impl CollidingStore {
    /// Wrap a store, failing the first `collisions` inserts.
    #[must_use]
    pub const fn new(inner: Arc<MemoryStore>, collisions: usize) -> Self {
        Self {
            inner,
            collisions: AtomicUsize::new(collisions),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Inserts attempted, including the failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for CollidingStore {
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.collisions.load(Ordering::SeqCst);
        if remaining > 0 {
            self.collisions.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Conflict(ORDER_NUMBER_KEY.to_owned()));
        }
        self.inner.insert_order(order).await
    }

    async fn attach_payment_reference(
        &self,
        id: OrderId,
        reference: &str,
    ) -> Result<Order, RepositoryError> {
        self.inner.attach_payment_reference(id, reference).await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.inner.get_order(id).await
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        self.inner.find_by_number(number).await
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        self.inner.find_by_payment_reference(reference).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, RepositoryError> {
        self.inner.list_orders(status).await
    }

    async fn apply_transition(
        &self,
        id: OrderId,
        plan: &TransitionPlan,
    ) -> Result<TransitionOutcome, RepositoryError> {
        self.inner.apply_transition(id, plan).await
    }

    async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        self.inner.stats().await
    }
}

// =============================================================================
// Test shop
// =============================================================================

/// A fully wired shop on the in-memory store.
pub struct TestShop {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub config: OrderConfig,
    pub settings: ShopSettings,
}

impl Default for TestShop {
    fn default() -> Self {
        Self::new()
    }
}

impl TestShop {
    /// Default settings: USD, shipping 500.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(OrderConfig::default())
    }

    /// Custom order handling.
    #[must_use]
    pub fn with_config(config: OrderConfig) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            gateway: Arc::new(FakeGateway::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            config,
            settings: ShopSettings::default(),
        }
    }

    /// Add a visible product.
    pub async fn product(&self, name: &str, price: i64, stock: u32) -> Product {
        self.store
            .create_product(&ProductInput {
                name: name.to_owned(),
                slug: None,
                description: format!("{name}, printed in PLA"),
                price: Money::from_minor(price),
                stock,
                category: "Figurines".to_owned(),
                visible: true,
            })
            .await
            .unwrap()
    }

    /// Current stock of a product.
    pub async fn stock(&self, id: ProductId) -> u32 {
        self.store.get_product(id).await.unwrap().unwrap().stock
    }

    /// Current state of an order.
    pub async fn order(&self, id: OrderId) -> Order {
        self.store.get_order(id).await.unwrap().unwrap()
    }

    /// Persist settings and use them for subsequent calls.
    pub async fn save_settings(&mut self, settings: ShopSettings) {
        self.store.update_settings(&settings).await.unwrap();
        self.settings = settings;
    }

    #[must_use]
    pub fn checkout_service(&self) -> CheckoutService {
        CheckoutService::new(
            self.store.clone(),
            self.store.clone(),
            self.gateway.clone(),
            self.config.clone(),
        )
    }

    #[must_use]
    pub fn reconciler(&self) -> WebhookReconciler {
        WebhookReconciler::new(
            self.store.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }

    #[must_use]
    pub fn transitions(&self) -> TransitionService {
        TransitionService::new(
            self.store.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.config.clone(),
        )
    }

    /// Check out a single line for a valid customer.
    pub async fn checkout(&self, product: ProductId, quantity: u32) -> CheckoutReceipt {
        self.checkout_service()
            .checkout(request(&[(product, quantity)]), &self.settings)
            .await
            .unwrap()
    }

    /// Deliver a signed `payment_intent.succeeded` for an intent.
    pub async fn pay(&self, intent_id: &str) -> ReconcileOutcome {
        let payload = succeeded_event(intent_id);
        self.reconciler()
            .handle(&payload, &sign(&payload), self.store.as_ref())
            .await
            .unwrap()
    }

    /// Check out and pay, returning the paid order.
    pub async fn paid_order(&self, product: ProductId, quantity: u32) -> Order {
        let receipt = self.checkout(product, quantity).await;
        let order = self.order(receipt.order_id).await;
        let reference = order.payment_reference.unwrap();
        self.pay(&reference).await;
        self.order(receipt.order_id).await
    }

    /// Storefront router over this shop.
    #[must_use]
    pub fn storefront_router(&self) -> axum::Router {
        print_shop_storefront::router(print_shop_storefront::state::AppState::new(
            self.store.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.config.clone(),
            None,
        ))
    }

    /// Admin router over this shop, accepting [`ADMIN_TOKEN`].
    #[must_use]
    pub fn admin_router(&self) -> axum::Router {
        print_shop_admin::router(print_shop_admin::state::AppState::new(
            self.store.clone(),
            self.gateway.clone(),
            self.notifier.clone(),
            self.config.clone(),
            SecretString::from(ADMIN_TOKEN),
            None,
        ))
    }
}

/// A checkout request for a valid customer.
#[must_use]
pub fn request(lines: &[(ProductId, u32)]) -> CheckoutRequest {
    CheckoutRequest {
        items: lines
            .iter()
            .map(|&(product_id, quantity)| CartLine {
                product_id,
                quantity,
            })
            .collect(),
        customer: CustomerInput {
            name: "Ada Lovelace".to_owned(),
            email: "ada@example.com".to_owned(),
            address: Some(serde_json::json!({
                "line1": "12 St James's Square",
                "city": "London",
                "postal_code": "SW1Y 4JH",
            })),
        },
    }
}

//! Webhook reconciler.
//!
//! Verifies a gateway event, then drives the matching order from `PENDING`
//! to `PAID` through the store's compare-and-set. Only the caller whose
//! compare-and-set wins sees [`ReconcileOutcome::Paid`] and sends the
//! confirmation, so redelivered or concurrent events decrement stock and
//! email the customer exactly once.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use print_shop_core::{OrderNumber, OrderStatus, Planned};

use crate::config::{OrderConfig, OversoldPolicy};
use crate::error::ErrorKind;
use crate::ledger::StockReport;
use crate::models::{Order, ShopSettings};
use crate::notifications::Notifier;
use crate::payments::{GatewayError, GatewayEvent, PaymentGateway};
use crate::store::{OrderStore, RepositoryError, SettingsStore, TransitionOutcome};

/// Errors from webhook handling.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The signature did not verify. Nothing was looked up.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The body is not a recognizable event.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Storage failure; the gateway should redeliver.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl WebhookError {
    /// Error class for HTTP mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSignature(_) | Self::MalformedPayload(_) => ErrorKind::Integrity,
            Self::Repository(e) => e.kind(),
        }
    }
}

impl From<GatewayError> for WebhookError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::MalformedPayload(msg) => Self::MalformedPayload(msg),
            other => Self::InvalidSignature(other.to_string()),
        }
    }
}

/// What a verified event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// This event moved the order to `PAID`.
    Paid {
        /// The paid order.
        order_number: OrderNumber,
        /// Some line hit the zero stock floor.
        oversold: bool,
    },
    /// The order had already left `PENDING`.
    AlreadyProcessed,
    /// No order carries the event's intent id.
    UnknownIntent,
    /// Event type that does not drive a transition.
    Ignored,
}

/// Webhook reconciler.
#[derive(Clone)]
pub struct WebhookReconciler {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: OrderConfig,
}

impl std::fmt::Debug for WebhookReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookReconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WebhookReconciler {
    /// Create the reconciler.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: OrderConfig,
    ) -> Self {
        Self {
            orders,
            gateway,
            notifier,
            config,
        }
    }

    /// Verify a raw delivery, then apply it.
    ///
    /// Shop settings are read only after the signature checks out.
    ///
    /// # Errors
    ///
    /// `InvalidSignature` or `MalformedPayload` if the delivery is rejected;
    /// `Repository` if storage fails after verification.
    #[instrument(skip_all, fields(payload_len = payload.len()))]
    pub async fn handle(
        &self,
        payload: &[u8],
        signature_header: &str,
        settings: &dyn SettingsStore,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let event = self.verify(payload, signature_header)?;
        let shop = settings.get_settings().await?;
        self.apply(event, &shop).await
    }

    /// Check the signature and type the payload. No I/O.
    ///
    /// # Errors
    ///
    /// `InvalidSignature` or `MalformedPayload`; both are logged as security
    /// events.
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<GatewayEvent, WebhookError> {
        self.gateway
            .verify_and_parse(payload, signature_header)
            .map_err(|e| {
                warn!(target: "security", error = %e, "Rejected webhook delivery");
                WebhookError::from(e)
            })
    }

    /// Apply a verified event.
    ///
    /// # Errors
    ///
    /// `Repository` if the lookup or transition fails.
    #[instrument(skip(self, event, shop), fields(event_id = %event.event_id()))]
    pub async fn apply(
        &self,
        event: GatewayEvent,
        shop: &ShopSettings,
    ) -> Result<ReconcileOutcome, WebhookError> {
        let intent_id = match event {
            GatewayEvent::PaymentSucceeded { intent_id, .. } => intent_id,
            GatewayEvent::Other { event_type, .. } => {
                info!(%event_type, "Ignoring webhook event");
                return Ok(ReconcileOutcome::Ignored);
            }
        };

        let Some(order) = self.orders.find_by_payment_reference(&intent_id).await? else {
            info!(payment_reference = %intent_id, "No order for payment intent");
            return Ok(ReconcileOutcome::UnknownIntent);
        };

        let plan = match order.status.plan_to(OrderStatus::Paid) {
            Ok(Planned::Move(plan)) => plan,
            Ok(Planned::AlreadyThere) => {
                info!(order_number = %order.order_number, "Payment already recorded");
                return Ok(ReconcileOutcome::AlreadyProcessed);
            }
            Err(e) => {
                warn!(
                    order_number = %order.order_number,
                    status = %order.status,
                    error = %e,
                    "Payment succeeded for an order past PENDING"
                );
                return Ok(ReconcileOutcome::AlreadyProcessed);
            }
        };

        match self.orders.apply_transition(order.id, &plan).await? {
            TransitionOutcome::Stale(current) => {
                info!(
                    order_number = %current.order_number,
                    status = %current.status,
                    "Concurrent delivery already moved the order"
                );
                Ok(ReconcileOutcome::AlreadyProcessed)
            }
            TransitionOutcome::Applied { order, stock } => {
                self.notifier.send_confirmation(&order, shop);
                self.report_oversold(&order, &stock);

                info!(
                    order_number = %order.order_number,
                    payment_reference = %intent_id,
                    skipped_lines = stock.skipped,
                    "Order paid"
                );
                Ok(ReconcileOutcome::Paid {
                    order_number: order.order_number,
                    oversold: stock.is_oversold(),
                })
            }
        }
    }

    fn report_oversold(&self, order: &Order, stock: &StockReport) {
        if !stock.is_oversold() {
            return;
        }

        for adj in stock.oversold() {
            warn!(
                order_number = %order.order_number,
                product_id = %adj.product_id,
                requested = adj.requested,
                available = adj.before,
                "Stock oversold, floored at zero"
            );
        }

        if self.config.oversold_policy != OversoldPolicy::FloorAndAlert {
            return;
        }
        match &self.config.operator_email {
            Some(to) => {
                self.notifier
                    .send_oversold_alert(order, to, stock.oversold().copied().collect());
            }
            None => warn!(
                order_number = %order.order_number,
                "Oversold alert requested but OPERATOR_EMAIL is not set"
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use print_shop_core::Email;

    use super::*;
    use crate::services::test_support::{
        FakeGateway, RecordingNotifier, SIGNATURE, product, stock_of, succeeded,
    };
    use crate::services::{CartLine, CheckoutRequest, CheckoutService, CustomerInput};
    use crate::store::MemoryStore;

    struct Harness {
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        reconciler: WebhookReconciler,
        checkout: CheckoutService,
    }

    fn harness(config: OrderConfig) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        Harness {
            reconciler: WebhookReconciler::new(
                store.clone(),
                gateway.clone(),
                notifier.clone(),
                config.clone(),
            ),
            checkout: CheckoutService::new(store.clone(), store.clone(), gateway, config),
            store,
            notifier,
        }
    }

    async fn place(h: &Harness, product_id: print_shop_core::ProductId, quantity: u32) -> String {
        let receipt = h
            .checkout
            .checkout(
                CheckoutRequest {
                    items: vec![CartLine {
                        product_id,
                        quantity,
                    }],
                    customer: CustomerInput {
                        name: "Ada".to_owned(),
                        email: "ada@example.com".to_owned(),
                        address: None,
                    },
                },
                &ShopSettings::default(),
            )
            .await
            .unwrap();
        h.store
            .get_order(receipt.order_id)
            .await
            .unwrap()
            .unwrap()
            .payment_reference
            .unwrap()
    }

    #[tokio::test]
    async fn test_redelivery_applies_once() {
        let h = harness(OrderConfig::default());
        let dragon = product(&h.store, "Dragon", 1000, 5).await;
        let intent = place(&h, dragon.id, 2).await;

        let first = h
            .reconciler
            .handle(&succeeded(&intent), SIGNATURE, h.store.as_ref())
            .await
            .unwrap();
        assert!(matches!(first, ReconcileOutcome::Paid { oversold: false, .. }));

        for _ in 0..3 {
            let again = h
                .reconciler
                .handle(&succeeded(&intent), SIGNATURE, h.store.as_ref())
                .await
                .unwrap();
            assert_eq!(again, ReconcileOutcome::AlreadyProcessed);
        }

        assert_eq!(stock_of(&h.store, dragon.id).await, 3);
        assert_eq!(h.notifier.kinds(), vec!["order_confirmation"]);
        let order = h.store.find_by_payment_reference(&intent).await.unwrap().unwrap();
        assert!(order.confirmation_sent);
    }

    #[tokio::test]
    async fn test_bad_signature_touches_nothing() {
        let h = harness(OrderConfig::default());
        let dragon = product(&h.store, "Dragon", 1000, 5).await;
        let intent = place(&h, dragon.id, 2).await;

        let err = h
            .reconciler
            .handle(&succeeded(&intent), "forged", h.store.as_ref())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let order = h.store.find_by_payment_reference(&intent).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(stock_of(&h.store, dragon.id).await, 5);
        assert!(h.notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_intent_and_other_events_acknowledged() {
        let h = harness(OrderConfig::default());
        let outcome = h
            .reconciler
            .handle(&succeeded("pi_nobody"), SIGNATURE, h.store.as_ref())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::UnknownIntent);

        let other = br#"{"id":"evt_9","type":"charge.updated","data":{"object":{"id":"ch_1"}}}"#;
        let outcome = h
            .reconciler
            .handle(other, SIGNATURE, h.store.as_ref())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_oversold_floors_and_alerts_operator() {
        let config = OrderConfig {
            operator_email: Some(Email::parse("ops@example.com").unwrap()),
            ..OrderConfig::default()
        };
        let h = harness(config);
        let castle = product(&h.store, "Castle", 4999, 3).await;
        let first = place(&h, castle.id, 2).await;
        let second = place(&h, castle.id, 2).await;

        h.reconciler
            .handle(&succeeded(&first), SIGNATURE, h.store.as_ref())
            .await
            .unwrap();
        let outcome = h
            .reconciler
            .handle(&succeeded(&second), SIGNATURE, h.store.as_ref())
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Paid { oversold: true, .. }));
        assert_eq!(stock_of(&h.store, castle.id).await, 0);
        assert_eq!(
            h.notifier.kinds(),
            vec!["order_confirmation", "order_confirmation", "oversold_alert"]
        );
    }

    #[tokio::test]
    async fn test_floor_policy_does_not_alert() {
        let config = OrderConfig {
            oversold_policy: OversoldPolicy::Floor,
            operator_email: Some(Email::parse("ops@example.com").unwrap()),
            ..OrderConfig::default()
        };
        let h = harness(config);
        let castle = product(&h.store, "Castle", 4999, 1).await;
        let first = place(&h, castle.id, 1).await;
        let second = place(&h, castle.id, 1).await;

        for intent in [first, second] {
            h.reconciler
                .handle(&succeeded(&intent), SIGNATURE, h.store.as_ref())
                .await
                .unwrap();
        }
        assert!(!h.notifier.kinds().contains(&"oversold_alert"));
    }
}

//! Operator-driven status changes: cancel, ship, deliver, refund.
//!
//! Every move is planned against the order's current status and committed
//! with the store's compare-and-set. A refund calls the gateway first, under
//! a deadline, and only then commits `REFUNDED`; if the gateway fails the
//! order and its stock are left exactly as they were. A gateway answer of
//! "already refunded" on a refundable order means an earlier attempt went
//! through without us hearing back, so the order is committed `REFUNDED`.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use print_shop_core::{InvalidTransition, OrderId, OrderStatus, Planned, SideEffect};

use crate::config::OrderConfig;
use crate::error::ErrorKind;
use crate::ledger::StockReport;
use crate::models::{Order, ShopSettings};
use crate::notifications::Notifier;
use crate::payments::{GatewayError, PaymentGateway, RefundRecord};
use crate::store::{OrderStore, RepositoryError, TransitionOutcome};

/// Compare-and-set attempts before giving up on a contended order.
const MAX_ATTEMPTS: usize = 3;

/// Errors from operator transitions.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// No such order.
    #[error("order not found")]
    NotFound,

    /// The table does not allow the move.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Refund requested for an order that never got a payment intent.
    #[error("order has no payment reference")]
    MissingPaymentReference,

    /// The order is already `REFUNDED`.
    #[error("order already refunded")]
    AlreadyRefunded,

    /// The gateway refund failed or timed out; nothing changed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The order kept changing under us.
    #[error("order {0} is being modified concurrently, try again")]
    Contended(OrderId),

    /// Storage failure.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl TransitionError {
    /// Error class for HTTP mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::InvalidTransition(_)
            | Self::MissingPaymentReference
            | Self::AlreadyRefunded
            | Self::Contended(_) => ErrorKind::Validation,
            Self::Gateway(e) => e.kind(),
            Self::Repository(e) => e.kind(),
        }
    }
}

/// Result of an operator transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    /// The order after the request.
    pub order: Order,
    /// `false` when the order was already in the requested state.
    pub changed: bool,
    /// Stock adjustments made.
    pub stock: StockReport,
    /// Gateway refund issued by this request. `None` for non-refunds and when
    /// the gateway reported an earlier refund of the same payment.
    pub refund: Option<RefundRecord>,
}

impl TransitionReport {
    fn unchanged(order: Order, refund: Option<RefundRecord>) -> Self {
        Self {
            order,
            changed: false,
            stock: StockReport::default(),
            refund,
        }
    }
}

/// Status and refund handler.
#[derive(Clone)]
pub struct TransitionService {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    config: OrderConfig,
}

impl std::fmt::Debug for TransitionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TransitionService {
    /// Create the handler.
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

    /// Cancel a `PENDING` or `PAID` order, restoring stock if it was paid.
    ///
    /// # Errors
    ///
    /// See [`TransitionError`].
    pub async fn cancel(
        &self,
        id: OrderId,
        shop: &ShopSettings,
    ) -> Result<TransitionReport, TransitionError> {
        self.transition(id, OrderStatus::Cancelled, shop).await
    }

    /// Mark a `PAID` order shipped and email the customer.
    ///
    /// # Errors
    ///
    /// See [`TransitionError`].
    pub async fn mark_shipped(
        &self,
        id: OrderId,
        shop: &ShopSettings,
    ) -> Result<TransitionReport, TransitionError> {
        self.transition(id, OrderStatus::Shipped, shop).await
    }

    /// Mark a `SHIPPED` order delivered.
    ///
    /// # Errors
    ///
    /// See [`TransitionError`].
    pub async fn mark_delivered(
        &self,
        id: OrderId,
        shop: &ShopSettings,
    ) -> Result<TransitionReport, TransitionError> {
        self.transition(id, OrderStatus::Delivered, shop).await
    }

    /// Refund a paid order through the gateway, then restore its stock.
    ///
    /// # Errors
    ///
    /// `MissingPaymentReference`, `AlreadyRefunded`, `InvalidTransition`, or
    /// `Gateway` when the refund call fails or times out. In every error case
    /// the order is unchanged.
    pub async fn refund(
        &self,
        id: OrderId,
        shop: &ShopSettings,
    ) -> Result<TransitionReport, TransitionError> {
        self.transition(id, OrderStatus::Refunded, shop).await
    }

    /// Route a requested target status to the matching operation.
    ///
    /// `PENDING` and `PAID` are never operator targets; requesting them is
    /// a no-op for an order already there and invalid otherwise.
    ///
    /// # Errors
    ///
    /// See [`TransitionError`].
    pub async fn set_status(
        &self,
        id: OrderId,
        target: OrderStatus,
        shop: &ShopSettings,
    ) -> Result<TransitionReport, TransitionError> {
        match target {
            OrderStatus::Cancelled => self.cancel(id, shop).await,
            OrderStatus::Shipped => self.mark_shipped(id, shop).await,
            OrderStatus::Delivered => self.mark_delivered(id, shop).await,
            OrderStatus::Refunded => self.refund(id, shop).await,
            OrderStatus::Pending | OrderStatus::Paid => {
                let order = self.load(id).await?;
                if order.status == target {
                    Ok(TransitionReport::unchanged(order, None))
                } else {
                    Err(InvalidTransition {
                        from: order.status,
                        to: target,
                    }
                    .into())
                }
            }
        }
    }

    async fn load(&self, id: OrderId) -> Result<Order, TransitionError> {
        self.orders
            .get_order(id)
            .await?
            .ok_or(TransitionError::NotFound)
    }

    #[instrument(skip(self, shop), fields(order_id = %id, target = %target))]
    async fn transition(
        &self,
        id: OrderId,
        target: OrderStatus,
        shop: &ShopSettings,
    ) -> Result<TransitionReport, TransitionError> {
        let mut refund: Option<RefundRecord> = None;
        let mut refunded = false;

        for _ in 0..MAX_ATTEMPTS {
            let order = self.load(id).await?;

            if target == OrderStatus::Refunded && order.payment_reference.is_none() {
                return Err(TransitionError::MissingPaymentReference);
            }

            let plan = match order.status.plan_to(target) {
                Ok(Planned::Move(plan)) => plan,
                Ok(Planned::AlreadyThere) if target == OrderStatus::Refunded => {
                    // Someone else refunded first; our own refund, if any, is reported.
                    return if refunded {
                        Ok(TransitionReport::unchanged(order, refund))
                    } else {
                        Err(TransitionError::AlreadyRefunded)
                    };
                }
                Ok(Planned::AlreadyThere) => return Ok(TransitionReport::unchanged(order, None)),
                Err(e) => {
                    if refunded {
                        error!(
                            order_number = %order.order_number,
                            status = %order.status,
                            refund_id = refund.as_ref().map_or("unknown", |r| r.id.as_str()),
                            "Refund issued but order moved to a non-refundable state"
                        );
                    }
                    return Err(e.into());
                }
            };

            if plan.has(SideEffect::IssueRefund) && !refunded {
                refund = self.issue_refund(&order).await?;
                refunded = true;
            }

            match self.orders.apply_transition(id, &plan).await? {
                TransitionOutcome::Applied { order, stock } => {
                    if plan.has(SideEffect::SendShippingUpdate) {
                        self.notifier.send_shipping_update(&order, shop);
                    }
                    info!(
                        order_number = %order.order_number,
                        from = %plan.from,
                        to = %plan.to,
                        restored = stock.adjustments.len(),
                        skipped_lines = stock.skipped,
                        "Order status changed"
                    );
                    return Ok(TransitionReport {
                        order,
                        changed: true,
                        stock,
                        refund,
                    });
                }
                TransitionOutcome::Stale(current) => {
                    warn!(
                        order_number = %current.order_number,
                        expected = %plan.from,
                        actual = %current.status,
                        "Order changed during transition, re-planning"
                    );
                }
            }
        }

        Err(TransitionError::Contended(id))
    }

    /// Refund at the gateway. `None` means the gateway already holds a
    /// refund for this payment.
    async fn issue_refund(&self, order: &Order) -> Result<Option<RefundRecord>, TransitionError> {
        let reference = order
            .payment_reference
            .as_deref()
            .ok_or(TransitionError::MissingPaymentReference)?;
        let deadline = self.config.refund_timeout;

        let result = tokio::time::timeout(deadline, self.gateway.create_refund(reference))
            .await
            .map_err(|_| GatewayError::Timeout(deadline))
            .and_then(|result| result);

        match result {
            Ok(record) => {
                info!(
                    order_number = %order.order_number,
                    refund_id = %record.id,
                    refund_status = %record.status,
                    "Refund issued"
                );
                Ok(Some(record))
            }
            Err(GatewayError::AlreadyRefunded) => {
                warn!(
                    order_number = %order.order_number,
                    payment_reference = %reference,
                    status = %order.status,
                    "Gateway already holds a refund for this payment, committing REFUNDED"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(
                    order_number = %order.order_number,
                    payment_reference = %reference,
                    error = %e,
                    "Refund failed, order unchanged"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::models::{NewOrder, NewOrderItem};
    use crate::payments::{GatewayEvent, IntentRequest, PaymentIntent};
    use crate::services::test_support::{
        FakeGateway, RecordingNotifier, customer, product, stock_of,
    };
    use crate::store::MemoryStore;
    use print_shop_core::{Currency, Money, TransitionPlan};

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
        notifier: Arc<RecordingNotifier>,
        service: TransitionService,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        Harness {
            service: TransitionService::new(
                store.clone(),
                gateway.clone(),
                notifier.clone(),
                OrderConfig::default(),
            ),
            store,
            gateway,
            notifier,
        }
    }

    /// A paid order for `quantity` units of a product stocked at `stock`.
    async fn paid_order(h: &Harness, stock: u32, quantity: u32) -> (Order, print_shop_core::ProductId) {
        let p = product(&h.store, "Octopus", 1599, stock).await;
        let new = NewOrder::new(
            customer(),
            Currency::usd(),
            Money::from_minor(500),
            vec![NewOrderItem {
                product_id: p.id,
                product_name: p.name.clone(),
                quantity,
                price_at_time: p.price,
            }],
        )
        .unwrap();
        let order = h.store.insert_order(&new).await.unwrap();
        h.store
            .attach_payment_reference(order.id, &format!("pi_{}", order.id))
            .await
            .unwrap();
        let pay = TransitionPlan {
            from: OrderStatus::Pending,
            to: OrderStatus::Paid,
            effects: &[SideEffect::DecrementStock, SideEffect::SendConfirmation],
        };
        let TransitionOutcome::Applied { order, .. } =
            h.store.apply_transition(order.id, &pay).await.unwrap()
        else {
            panic!("pay should apply");
        };
        (order, p.id)
    }

    #[tokio::test]
    async fn test_refund_restores_stock_and_rejects_second() {
        let h = harness();
        let (order, product_id) = paid_order(&h, 5, 2).await;
        assert_eq!(stock_of(&h.store, product_id).await, 3);

        let report = h.service.refund(order.id, &ShopSettings::default()).await.unwrap();
        assert!(report.changed);
        assert_eq!(report.order.status, OrderStatus::Refunded);
        assert!(report.refund.is_some());
        assert_eq!(stock_of(&h.store, product_id).await, 5);

        let err = h.service.refund(order.id, &ShopSettings::default()).await.unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyRefunded));
        assert_eq!(h.gateway.refund_count(), 1);
        assert_eq!(stock_of(&h.store, product_id).await, 5);
    }

    #[tokio::test]
    async fn test_refund_gateway_failure_changes_nothing() {
        let h = harness();
        let (order, product_id) = paid_order(&h, 5, 2).await;
        *h.gateway.fail_refund.lock().unwrap() =
            Some(GatewayError::GatewayUnavailable("503".to_owned()));

        let err = h.service.refund(order.id, &ShopSettings::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Gateway);

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Paid);
        assert_eq!(stock_of(&h.store, product_id).await, 3);
    }

    struct SlowGateway;

    #[async_trait]
    impl PaymentGateway for SlowGateway {
        async fn create_intent(&self, _: &IntentRequest) -> Result<PaymentIntent, GatewayError> {
            Err(GatewayError::GatewayUnavailable("unused".to_owned()))
        }

        fn verify_and_parse(&self, _: &[u8], _: &str) -> Result<GatewayEvent, GatewayError> {
            Err(GatewayError::InvalidSignature("unused".to_owned()))
        }

        async fn create_refund(&self, _: &str) -> Result<RefundRecord, GatewayError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(GatewayError::GatewayUnavailable("too late".to_owned()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refund_timeout_leaves_order_paid() {
        let h = harness();
        let (order, product_id) = paid_order(&h, 5, 2).await;
        let service = TransitionService::new(
            h.store.clone(),
            Arc::new(SlowGateway),
            h.notifier.clone(),
            OrderConfig {
                refund_timeout: Duration::from_secs(1),
                ..OrderConfig::default()
            },
        );

        let err = service.refund(order.id, &ShopSettings::default()).await.unwrap_err();
        assert!(matches!(err, TransitionError::Gateway(GatewayError::Timeout(_))));
        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after.status, OrderStatus::Paid);
        assert_eq!(stock_of(&h.store, product_id).await, 3);
    }

    #[tokio::test]
    async fn test_gateway_already_refunded_commits_refund() {
        let h = harness();
        let (order, product_id) = paid_order(&h, 5, 2).await;
        *h.gateway.fail_refund.lock().unwrap() = Some(GatewayError::AlreadyRefunded);

        let report = h.service.refund(order.id, &ShopSettings::default()).await.unwrap();
        assert!(report.changed);
        assert_eq!(report.order.status, OrderStatus::Refunded);
        assert!(report.refund.is_none());
        assert_eq!(stock_of(&h.store, product_id).await, 5);
        assert_eq!(h.gateway.refund_count(), 0);
    }

    #[tokio::test]
    async fn test_ship_notifies_once_and_deliver() {
        let h = harness();
        let (order, _) = paid_order(&h, 5, 1).await;
        let shop = ShopSettings::default();

        let shipped = h.service.mark_shipped(order.id, &shop).await.unwrap();
        assert!(shipped.order.shipping_notified);
        let again = h.service.mark_shipped(order.id, &shop).await.unwrap();
        assert!(!again.changed);
        assert_eq!(h.notifier.kinds(), vec!["shipping_update"]);

        let delivered = h
            .service
            .set_status(order.id, OrderStatus::Delivered, &shop)
            .await
            .unwrap();
        assert_eq!(delivered.order.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_invalid_transition_leaves_order_untouched() {
        let h = harness();
        let (order, product_id) = paid_order(&h, 5, 2).await;
        let shop = ShopSettings::default();
        h.service.mark_shipped(order.id, &shop).await.unwrap();
        h.service.mark_delivered(order.id, &shop).await.unwrap();
        let before = h.store.get_order(order.id).await.unwrap().unwrap();

        let err = h
            .service
            .set_status(order.id, OrderStatus::Paid, &shop)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition(InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Paid
            })
        ));
        assert!(matches!(
            h.service.cancel(order.id, &shop).await,
            Err(TransitionError::InvalidTransition(_))
        ));

        let after = h.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(stock_of(&h.store, product_id).await, 3);
    }

    #[tokio::test]
    async fn test_cancel_paid_restores_stock() {
        let h = harness();
        let (order, product_id) = paid_order(&h, 5, 2).await;

        let report = h.service.cancel(order.id, &ShopSettings::default()).await.unwrap();
        assert_eq!(report.order.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&h.store, product_id).await, 5);
        assert_eq!(h.gateway.refund_count(), 0);
    }

    #[tokio::test]
    async fn test_refund_without_reference_rejected() {
        let h = harness();
        let new = NewOrder::new(customer(), Currency::usd(), Money::ZERO, vec![]).unwrap();
        let order = h.store.insert_order(&new).await.unwrap();

        let err = h.service.refund(order.id, &ShopSettings::default()).await.unwrap_err();
        assert!(matches!(err, TransitionError::MissingPaymentReference));
        assert!(matches!(
            h.service.refund(OrderId::generate(), &ShopSettings::default()).await,
            Err(TransitionError::NotFound)
        ));
    }
}

//! Operator status changes and refunds.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use print_shop_commerce::config::OrderConfig;
use print_shop_commerce::payments::GatewayError;
use print_shop_commerce::services::{CheckoutError, TransitionError};
use print_shop_commerce::models::Order;
use print_shop_commerce::store::{Catalog, OrderStore};
use print_shop_core::{InvalidTransition, OrderId, OrderStatus, ProductId};
use print_shop_integration_tests::{TestShop, request};

// =============================================================================
// Refunds
// =============================================================================

async fn paid_order_of(shop: &TestShop, lines: &[(ProductId, u32)]) -> Order {
    let receipt = shop
        .checkout_service()
        .checkout(request(lines), &shop.settings)
        .await
        .unwrap();
    let reference = shop.order(receipt.order_id).await.payment_reference.unwrap();
    shop.pay(&reference).await;
    shop.order(receipt.order_id).await
}

#[tokio::test]
async fn test_refund_paid_order_then_reject_second() {
    let shop = TestShop::new();
    let dragon = shop.product("Dragon Figurine", 2499, 5).await;
    let order = shop.paid_order(dragon.id, 2).await;
    assert_eq!(shop.stock(dragon.id).await, 3);

    let report = shop.transitions().refund(order.id, &shop.settings).await.unwrap();

    assert!(report.changed);
    assert_eq!(report.order.status, OrderStatus::Refunded);
    assert_eq!(report.refund.unwrap().intent_id, order.payment_reference.clone().unwrap());
    assert_eq!(shop.stock(dragon.id).await, 5);
    assert_eq!(shop.gateway.refunds().len(), 1);

    let second = shop.transitions().refund(order.id, &shop.settings).await;
    assert!(matches!(second, Err(TransitionError::AlreadyRefunded)));
    assert_eq!(shop.gateway.refunds().len(), 1);
    assert_eq!(shop.stock(dragon.id).await, 5);
}

#[tokio::test]
async fn test_refund_after_delivery() {
    let shop = TestShop::new();
    let stand = shop.product("Phone Stand", 1299, 10).await;
    let order = shop.paid_order(stand.id, 4).await;
    let service = shop.transitions();
    service.mark_shipped(order.id, &shop.settings).await.unwrap();
    service.mark_delivered(order.id, &shop.settings).await.unwrap();

    let report = service.refund(order.id, &shop.settings).await.unwrap();
    assert_eq!(report.order.status, OrderStatus::Refunded);
    assert_eq!(shop.stock(stand.id).await, 10);
}

#[tokio::test]
async fn test_refund_gateway_failure_changes_nothing() {
    let shop = TestShop::new();
    let dragon = shop.product("Dragon Figurine", 2499, 5).await;
    let order = shop.paid_order(dragon.id, 2).await;
    shop.gateway
        .fail_next_refund(GatewayError::GatewayUnavailable("503 Service Unavailable".to_owned()));

    let err = shop
        .transitions()
        .refund(order.id, &shop.settings)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransitionError::Gateway(GatewayError::GatewayUnavailable(_))
    ));
    let after = shop.order(order.id).await;
    assert_eq!(after.status, OrderStatus::Paid);
    assert_eq!(shop.stock(dragon.id).await, 3);

    // The operator retries once the gateway is back.
    let report = shop.transitions().refund(order.id, &shop.settings).await.unwrap();
    assert_eq!(report.order.status, OrderStatus::Refunded);
    assert_eq!(shop.stock(dragon.id).await, 5);
}

#[tokio::test(start_paused = true)]
async fn test_refund_timeout_changes_nothing() {
    let shop = TestShop::with_config(OrderConfig {
        refund_timeout: Duration::from_secs(2),
        ..OrderConfig::default()
    });
    let dragon = shop.product("Dragon Figurine", 2499, 5).await;
    let order = shop.paid_order(dragon.id, 1).await;
    shop.gateway.delay_refunds(Duration::from_secs(60));

    let err = shop
        .transitions()
        .refund(order.id, &shop.settings)
        .await
        .unwrap_err();

    assert!(matches!(err, TransitionError::Gateway(GatewayError::Timeout(_))));
    assert_eq!(shop.order(order.id).await.status, OrderStatus::Paid);
    assert_eq!(shop.stock(dragon.id).await, 4);
}

#[tokio::test(start_paused = true)]
async fn test_refund_retry_after_lost_response_commits() {
    let shop = TestShop::with_config(OrderConfig {
        refund_timeout: Duration::from_secs(1),
        ..OrderConfig::default()
    });
    let dragon = shop.product("Dragon Figurine", 2499, 5).await;
    let order = shop.paid_order(dragon.id, 2).await;
    shop.gateway.delay_next_refund_response(Duration::from_secs(60));

    // The gateway refunds the payment but the answer arrives too late.
    let err = shop
        .transitions()
        .refund(order.id, &shop.settings)
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::Gateway(GatewayError::Timeout(_))));
    assert_eq!(shop.gateway.refunds().len(), 1);
    assert_eq!(shop.order(order.id).await.status, OrderStatus::Paid);
    assert_eq!(shop.stock(dragon.id).await, 3);

    let report = shop.transitions().refund(order.id, &shop.settings).await.unwrap();
    assert!(report.changed);
    assert!(report.refund.is_none());
    assert_eq!(report.order.status, OrderStatus::Refunded);
    assert_eq!(shop.stock(dragon.id).await, 5);
    assert_eq!(shop.gateway.refunds().len(), 1);

    let again = shop.transitions().refund(order.id, &shop.settings).await;
    assert!(matches!(again, Err(TransitionError::AlreadyRefunded)));
    assert_eq!(shop.stock(dragon.id).await, 5);
}

#[tokio::test]
async fn test_refund_requires_payment_reference() {
    let shop = TestShop::new();
    let dragon = shop.product("Dragon Figurine", 2499, 5).await;
    shop.gateway
        .fail_next_intent(GatewayError::GatewayUnavailable("timeout".to_owned()));
    let err = shop
        .checkout_service()
        .checkout(request(&[(dragon.id, 1)]), &shop.settings)
        .await
        .unwrap_err();
    let CheckoutError::Gateway { order_number, .. } = err else {
        panic!("expected gateway error");
    };
    let order = shop.store.find_by_number(&order_number).await.unwrap().unwrap();

    let err = shop
        .transitions()
        .refund(order.id, &shop.settings)
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::MissingPaymentReference));
    assert!(shop.gateway.refunds().is_empty());
}

#[tokio::test]
async fn test_refund_pending_order_is_invalid() {
    let shop = TestShop::new();
    let dragon = shop.product("Dragon Figurine", 2499, 5).await;
    let receipt = shop.checkout(dragon.id, 1).await;

    let err = shop
        .transitions()
        .refund(receipt.order_id, &shop.settings)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransitionError::InvalidTransition(InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Refunded,
        })
    ));
    assert!(shop.gateway.refunds().is_empty());
}

// =============================================================================
// Status changes
// =============================================================================

#[tokio::test]
async fn test_invalid_transition_leaves_order_untouched() {
    let shop = TestShop::new();
    let dragon = shop.product("Dragon Figurine", 2499, 5).await;
    let order = shop.paid_order(dragon.id, 1).await;
    let service = shop.transitions();
    service.mark_shipped(order.id, &shop.settings).await.unwrap();
    service.mark_delivered(order.id, &shop.settings).await.unwrap();
    let before = shop.order(order.id).await;
    let sent_before = shop.notifier.sent().len();

    for target in [
        OrderStatus::Paid,
        OrderStatus::Pending,
        OrderStatus::Cancelled,
        OrderStatus::Shipped,
    ] {
        let err = service
            .set_status(order.id, target, &shop.settings)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                TransitionError::InvalidTransition(InvalidTransition {
                    from: OrderStatus::Delivered,
                    to,
                }) if to == target
            ),
            "{target} should be rejected, got {err:?}"
        );
    }

    let after = shop.order(order.id).await;
    assert_eq!(after.status, before.status);
    assert_eq!(after.confirmation_sent, before.confirmation_sent);
    assert_eq!(after.shipping_notified, before.shipping_notified);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(shop.stock(dragon.id).await, 4);
    assert_eq!(shop.notifier.sent().len(), sent_before);
}

#[tokio::test]
async fn test_ship_notifies_once() {
    let shop = TestShop::new();
    let dragon = shop.product("Dragon Figurine", 2499, 5).await;
    let order = shop.paid_order(dragon.id, 1).await;
    let service = shop.transitions();

    let first = service
        .set_status(order.id, OrderStatus::Shipped, &shop.settings)
        .await
        .unwrap();
    let again = service
        .set_status(order.id, OrderStatus::Shipped, &shop.settings)
        .await
        .unwrap();

    assert!(first.changed);
    assert!(first.order.shipping_notified);
    assert!(!again.changed);
    assert_eq!(shop.notifier.count("shipping_update"), 1);
    assert_eq!(shop.stock(dragon.id).await, 4);
}

#[tokio::test]
async fn test_cancel_paid_restores_stock_cancel_pending_does_not() {
    let shop = TestShop::new();
    let octopus = shop.product("Articulated Octopus", 1599, 10).await;
    let paid = shop.paid_order(octopus.id, 3).await;
    let pending = shop.checkout(octopus.id, 2).await;
    assert_eq!(shop.stock(octopus.id).await, 7);

    let report = shop.transitions().cancel(paid.id, &shop.settings).await.unwrap();
    assert_eq!(report.stock.adjustments.len(), 1);
    assert_eq!(shop.stock(octopus.id).await, 10);

    let report = shop
        .transitions()
        .cancel(pending.order_id, &shop.settings)
        .await
        .unwrap();
    assert!(report.stock.adjustments.is_empty());
    assert_eq!(shop.stock(octopus.id).await, 10);

    // Repeating is a no-op.
    let again = shop.transitions().cancel(paid.id, &shop.settings).await.unwrap();
    assert!(!again.changed);
    assert_eq!(shop.stock(octopus.id).await, 10);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let shop = TestShop::new();
    let err = shop
        .transitions()
        .cancel(OrderId::generate(), &shop.settings)
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::NotFound));
}

#[tokio::test]
async fn test_restore_skips_lines_of_deleted_products() {
    let shop = TestShop::new();
    let dragon = shop.product("Dragon Figurine", 2499, 10).await;
    let stand = shop.product("Phone Stand", 1299, 10).await;
    let refunded = paid_order_of(&shop, &[(dragon.id, 2), (stand.id, 1)]).await;
    let cancelled = paid_order_of(&shop, &[(dragon.id, 3), (stand.id, 2)]).await;
    assert_eq!(shop.stock(dragon.id).await, 5);
    assert_eq!(shop.stock(stand.id).await, 7);

    shop.store.delete_product(stand.id).await.unwrap();

    let report = shop.transitions().refund(refunded.id, &shop.settings).await.unwrap();
    assert_eq!(report.order.status, OrderStatus::Refunded);
    assert_eq!(report.stock.adjustments.len(), 1);
    assert_eq!(report.stock.skipped, 1);
    assert_eq!(shop.stock(dragon.id).await, 7);

    let report = shop.transitions().cancel(cancelled.id, &shop.settings).await.unwrap();
    assert_eq!(report.order.status, OrderStatus::Cancelled);
    assert_eq!(report.stock.adjustments.len(), 1);
    assert_eq!(report.stock.skipped, 1);
    assert_eq!(shop.stock(dragon.id).await, 10);

    assert!(shop.store.get_product(stand.id).await.unwrap().is_none());
    let orphan = report
        .order
        .items
        .iter()
        .find(|item| item.product_name == "Phone Stand")
        .unwrap();
    assert!(orphan.product_id.is_none());
    assert_eq!(orphan.quantity, 2);
}

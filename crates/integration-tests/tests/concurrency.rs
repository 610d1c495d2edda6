//! Racing webhook deliveries, checkouts and operator actions.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use tokio::task::JoinSet;

use print_shop_commerce::services::{ReconcileOutcome, TransitionError};
use print_shop_core::OrderStatus;
use print_shop_integration_tests::{TestShop, sign, succeeded_event};

const DELIVERIES: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_redeliveries_pay_exactly_once() {
    let shop = Arc::new(TestShop::new());
    let dragon = shop.product("Dragon Figurine", 2499, 10).await;
    let receipt = shop.checkout(dragon.id, 3).await;
    let reference = shop.order(receipt.order_id).await.payment_reference.unwrap();

    let payload = Arc::new(succeeded_event(&reference));
    let header = Arc::new(sign(&payload));
    let mut tasks = JoinSet::new();
    for _ in 0..DELIVERIES {
        let shop = shop.clone();
        let payload = payload.clone();
        let header = header.clone();
        tasks.spawn(async move {
            shop.reconciler()
                .handle(&payload, &header, shop.store.as_ref())
                .await
                .unwrap()
        });
    }

    let outcomes = tasks.join_all().await;
    let paid = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::Paid { .. }))
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|o| **o == ReconcileOutcome::AlreadyProcessed)
        .count();

    assert_eq!(paid, 1);
    assert_eq!(duplicates, DELIVERIES - 1);
    assert_eq!(shop.stock(dragon.id).await, 7);
    assert_eq!(shop.notifier.count("order_confirmation"), 1);
    assert_eq!(shop.order(receipt.order_id).await.status, OrderStatus::Paid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_lose_stock_updates() {
    let shop = Arc::new(TestShop::new());
    let clips = shop.product("Cable Organizer Set", 899, 50).await;

    let mut references = Vec::new();
    for _ in 0..20 {
        let receipt = shop.checkout(clips.id, 2).await;
        references.push(shop.order(receipt.order_id).await.payment_reference.unwrap());
    }

    let mut tasks = JoinSet::new();
    for reference in references {
        let shop = shop.clone();
        tasks.spawn(async move { shop.pay(&reference).await });
    }
    let outcomes = tasks.join_all().await;

    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, ReconcileOutcome::Paid { oversold: false, .. }))
    );
    assert_eq!(shop.stock(clips.id).await, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_oversell_floors_at_zero() {
    let shop = Arc::new(TestShop::new());
    let castle = shop.product("Medieval Castle", 4999, 5).await;

    // Every checkout sees 5 in stock; 12 units get paid for. Whichever
    // payment lands first fits, every later one hits the floor.
    let mut references = Vec::new();
    for _ in 0..4 {
        let receipt = shop.checkout(castle.id, 3).await;
        references.push(shop.order(receipt.order_id).await.payment_reference.unwrap());
    }

    let mut tasks = JoinSet::new();
    for reference in references {
        let shop = shop.clone();
        tasks.spawn(async move { shop.pay(&reference).await });
    }
    let outcomes = tasks.join_all().await;

    let oversold = outcomes
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::Paid { oversold: true, .. }))
        .count();
    assert_eq!(oversold, 3, "{outcomes:?}");
    assert_eq!(shop.stock(castle.id).await, 0);
    assert_eq!(shop.notifier.count("order_confirmation"), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refunds_refund_once() {
    let shop = Arc::new(TestShop::new());
    let stand = shop.product("Phone Stand", 1299, 10).await;
    let order = shop.paid_order(stand.id, 4).await;

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let shop = shop.clone();
        tasks.spawn(async move { shop.transitions().refund(order.id, &shop.settings).await });
    }
    let results = tasks.join_all().await;

    // Losers either see the committed refund or learn of it from the
    // gateway; only one request moves the order.
    let changed = results
        .iter()
        .filter(|r| r.as_ref().is_ok_and(|report| report.changed))
        .count();
    assert_eq!(changed, 1, "{results:?}");
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
        e,
        TransitionError::AlreadyRefunded | TransitionError::Contended(_)
    )));
    assert_eq!(shop.gateway.refunds().len(), 1);
    assert_eq!(shop.stock(stand.id).await, 10);
    assert_eq!(shop.order(order.id).await.status, OrderStatus::Refunded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_and_ship_race_has_one_winner() {
    for _ in 0..10 {
        let shop = Arc::new(TestShop::new());
        let octopus = shop.product("Articulated Octopus", 1599, 10).await;
        let order = shop.paid_order(octopus.id, 2).await;

        let cancel = {
            let shop = shop.clone();
            tokio::spawn(async move { shop.transitions().cancel(order.id, &shop.settings).await })
        };
        let ship = {
            let shop = shop.clone();
            tokio::spawn(
                async move { shop.transitions().mark_shipped(order.id, &shop.settings).await },
            )
        };
        let cancel = cancel.await.unwrap();
        let ship = ship.await.unwrap();

        assert!(cancel.is_ok() != ship.is_ok(), "{cancel:?} / {ship:?}");
        let final_order = shop.order(order.id).await;
        if cancel.is_ok() {
            assert_eq!(final_order.status, OrderStatus::Cancelled);
            assert_eq!(shop.stock(octopus.id).await, 10);
            assert_eq!(shop.notifier.count("shipping_update"), 0);
        } else {
            assert_eq!(final_order.status, OrderStatus::Shipped);
            assert_eq!(shop.stock(octopus.id).await, 8);
            assert_eq!(shop.notifier.count("shipping_update"), 1);
        }
    }
}

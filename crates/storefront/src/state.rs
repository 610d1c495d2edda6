//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use print_shop_commerce::config::OrderConfig;
use print_shop_commerce::notifications::Notifier;
use print_shop_commerce::payments::PaymentGateway;
use print_shop_commerce::services::{CheckoutService, WebhookReconciler};
use print_shop_commerce::store::{Catalog, OrderStore, SettingsStore};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`. Stores and the gateway are
/// trait objects so tests can run the full router on the in-memory store.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    settings: Arc<dyn SettingsStore>,
    checkout: CheckoutService,
    reconciler: WebhookReconciler,
    pool: Option<PgPool>,
}

impl AppState {
    /// Build state around a store that implements every store trait.
    pub fn new<S>(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: OrderConfig,
        pool: Option<PgPool>,
    ) -> Self
    where
        S: Catalog + OrderStore + SettingsStore + 'static,
    {
        let checkout = CheckoutService::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            config.clone(),
        );
        let reconciler = WebhookReconciler::new(store.clone(), gateway, notifier, config);

        Self {
            inner: Arc::new(AppStateInner {
                catalog: store.clone(),
                orders: store.clone(),
                settings: store,
                checkout,
                reconciler,
                pool,
            }),
        }
    }

    /// Product catalog.
    #[must_use]
    pub fn catalog(&self) -> &dyn Catalog {
        self.inner.catalog.as_ref()
    }

    /// Order records.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderStore {
        self.inner.orders.as_ref()
    }

    /// Shop settings.
    #[must_use]
    pub fn settings(&self) -> &dyn SettingsStore {
        self.inner.settings.as_ref()
    }

    /// Checkout orchestrator.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    /// Webhook reconciler.
    #[must_use]
    pub fn reconciler(&self) -> &WebhookReconciler {
        &self.inner.reconciler
    }

    /// Database pool, when running on `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}

//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::SecretString;
use sqlx::PgPool;

use print_shop_commerce::config::OrderConfig;
use print_shop_commerce::notifications::Notifier;
use print_shop_commerce::payments::PaymentGateway;
use print_shop_commerce::services::TransitionService;
use print_shop_commerce::store::{Catalog, OrderStore, SettingsStore};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    settings: Arc<dyn SettingsStore>,
    transitions: TransitionService,
    api_token: SecretString,
    pool: Option<PgPool>,
}

impl AppState {
    /// Build state around a store that implements every store trait.
    pub fn new<S>(
        store: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: OrderConfig,
        api_token: SecretString,
        pool: Option<PgPool>,
    ) -> Self
    where
        S: Catalog + OrderStore + SettingsStore + 'static,
    {
        let transitions = TransitionService::new(store.clone(), gateway, notifier, config);

        Self {
            inner: Arc::new(AppStateInner {
                catalog: store.clone(),
                orders: store.clone(),
                settings: store,
                transitions,
                api_token,
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

    /// Status and refund handler.
    #[must_use]
    pub fn transitions(&self) -> &TransitionService {
        &self.inner.transitions
    }

    /// Operator bearer token.
    #[must_use]
    pub fn api_token(&self) -> &SecretString {
        &self.inner.api_token
    }

    /// Database pool, when running on `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}

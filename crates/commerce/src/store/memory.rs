//! In-memory store backed by `DashMap`.
//!
//! Every operation that reads and then writes an order holds that order's
//! entry guard for the whole step, which gives the same compare-and-set
//! guarantee as the conditional `UPDATE` in `PostgreSQL`. Guards are taken in
//! one direction only (orders, then products) and never across an `.await`.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use print_shop_core::{
    OrderId, OrderNumber, OrderStatus, ProductId, SideEffect, TransitionPlan,
};

use super::{Catalog, OrderStore, RepositoryError, SettingsStore, TransitionOutcome};
use crate::db::{ORDER_NUMBER_KEY, PAYMENT_REFERENCE_KEY, PRODUCT_SLUG_KEY};
use crate::ledger::{StockAdjustment, StockMovement, StockReport, stock_lines, unlinked_items};
use crate::models::{
    NewOrder, Order, OrderStats, Product, ProductFilter, ProductInput, ShopSettings,
};

/// Catalog, orders and settings held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    products: DashMap<ProductId, Product>,
    slugs: DashMap<String, ProductId>,
    orders: DashMap<OrderId, Order>,
    by_number: DashMap<OrderNumber, OrderId>,
    by_reference: DashMap<String, OrderId>,
    settings: RwLock<Option<ShopSettings>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_slug(&self, slug: &str, id: ProductId) -> Result<(), RepositoryError> {
        match self.slugs.entry(slug.to_owned()) {
            Entry::Occupied(entry) if *entry.get() != id => {
                Err(RepositoryError::Conflict(PRODUCT_SLUG_KEY.to_owned()))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(())
            }
        }
    }

    fn release_slug(&self, slug: &str, id: ProductId) {
        self.slugs.remove_if(slug, |_, owner| *owner == id);
    }

    fn stock_for(&self, movement: StockMovement, order: &Order) -> StockReport {
        let now = Utc::now();
        let mut report = StockReport {
            skipped: unlinked_items(&order.items),
            ..StockReport::default()
        };
        for line in stock_lines(&order.items) {
            match self.products.get_mut(&line.product_id) {
                Some(mut product) => {
                    let adjustment = StockAdjustment::compute(movement, line, product.stock);
                    product.stock = adjustment.after;
                    product.updated_at = now;
                    report.adjustments.push(adjustment);
                }
                None => report.skipped += 1,
            }
        }
        report
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let mut categories: Vec<String> = self
            .products
            .iter()
            .filter(|entry| entry.visible && !entry.category.is_empty())
            .map(|entry| entry.category.clone())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn create_product(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let id = ProductId::generate();
        let slug = input.resolved_slug();
        self.claim_slug(&slug, id)?;

        let now = Utc::now();
        let product = Product {
            id,
            name: input.name.clone(),
            slug,
            description: input.description.clone(),
            price: input.price,
            stock: input.stock,
            category: input.category.clone(),
            visible: input.visible,
            created_at: now,
            updated_at: now,
        };
        self.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let old_slug = self
            .products
            .get(&id)
            .map(|entry| entry.slug.clone())
            .ok_or(RepositoryError::NotFound)?;
        let slug = input.resolved_slug();
        self.claim_slug(&slug, id)?;

        let Some(mut product) = self.products.get_mut(&id) else {
            self.release_slug(&slug, id);
            return Err(RepositoryError::NotFound);
        };
        product.name.clone_from(&input.name);
        product.slug.clone_from(&slug);
        product.description.clone_from(&input.description);
        product.price = input.price;
        product.stock = input.stock;
        product.category.clone_from(&input.category);
        product.visible = input.visible;
        product.updated_at = Utc::now();
        let updated = product.clone();
        drop(product);

        if old_slug != slug {
            self.release_slug(&old_slug, id);
        }
        Ok(updated)
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        let (_, product) = self.products.remove(&id).ok_or(RepositoryError::NotFound)?;
        self.release_slug(&product.slug, id);

        for mut order in self.orders.iter_mut() {
            for item in &mut order.items {
                if item.product_id == Some(id) {
                    item.product_id = None;
                }
            }
        }
        Ok(())
    }

    async fn low_stock(
        &self,
        threshold: u32,
        limit: usize,
    ) -> Result<Vec<Product>, RepositoryError> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|entry| entry.visible && entry.stock < threshold)
            .map(|entry| entry.value().clone())
            .collect();
        products.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
        products.truncate(limit);
        Ok(products)
    }

    async fn product_count(&self) -> Result<u64, RepositoryError> {
        Ok(self.products.len() as u64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        match self.by_number.entry(new.order_number.clone()) {
            Entry::Occupied(_) => return Err(RepositoryError::Conflict(ORDER_NUMBER_KEY.to_owned())),
            Entry::Vacant(entry) => {
                entry.insert(new.id);
            }
        }

        let order = Order::from_new(new, Utc::now());
        self.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn attach_payment_reference(
        &self,
        id: OrderId,
        reference: &str,
    ) -> Result<Order, RepositoryError> {
        let mut order = self.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.payment_reference.is_some() || order.status != OrderStatus::Pending {
            return Err(RepositoryError::Conflict(
                "payment reference already set or order not pending".to_owned(),
            ));
        }

        match self.by_reference.entry(reference.to_owned()) {
            Entry::Occupied(_) => {
                return Err(RepositoryError::Conflict(PAYMENT_REFERENCE_KEY.to_owned()));
            }
            Entry::Vacant(entry) => {
                entry.insert(id);
            }
        }

        order.payment_reference = Some(reference.to_owned());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        let Some(id) = self.by_number.get(number).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.get_order(id).await
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let Some(id) = self.by_reference.get(reference).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.get_order(id).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| status.is_none_or(|s| entry.status == s))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn apply_transition(
        &self,
        id: OrderId,
        plan: &TransitionPlan,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut order = self.orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.status != plan.from {
            return Ok(TransitionOutcome::Stale(order.clone()));
        }

        let stock = StockMovement::for_plan(plan)
            .map(|movement| self.stock_for(movement, &order))
            .unwrap_or_default();

        order.status = plan.to;
        if plan.has(SideEffect::SendConfirmation) {
            order.confirmation_sent = true;
        }
        if plan.has(SideEffect::SendShippingUpdate) {
            order.shipping_notified = true;
        }
        order.updated_at = Utc::now();

        Ok(TransitionOutcome::Applied {
            order: order.clone(),
            stock,
        })
    }

    async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let mut stats = OrderStats::default();
        for entry in self.orders.iter() {
            stats.order_count += 1;
            if entry.status == OrderStatus::Pending {
                stats.pending_count += 1;
            }
            if entry.status.is_revenue() {
                stats.revenue = stats
                    .revenue
                    .checked_add(entry.total)
                    .ok_or_else(|| RepositoryError::DataCorruption("revenue overflow".to_owned()))?;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_settings(&self) -> Result<ShopSettings, RepositoryError> {
        let guard = self
            .settings
            .read()
            .map_err(|_| RepositoryError::DataCorruption("settings lock poisoned".to_owned()))?;
        Ok(guard.clone().unwrap_or_default())
    }

    async fn update_settings(&self, settings: &ShopSettings) -> Result<(), RepositoryError> {
        let mut guard = self
            .settings
            .write()
            .map_err(|_| RepositoryError::DataCorruption("settings lock poisoned".to_owned()))?;
        *guard = Some(settings.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use print_shop_core::{Currency, Email, Money, Planned};

    use crate::models::{CustomerDetails, NewOrderItem};

    fn input(name: &str, stock: u32) -> ProductInput {
        ProductInput {
            name: name.to_owned(),
            slug: None,
            description: String::new(),
            price: Money::from_minor(1000),
            stock,
            category: "Figurines".to_owned(),
            visible: true,
        }
    }

    fn new_order(product: &Product, quantity: u32) -> NewOrder {
        NewOrder::new(
            CustomerDetails {
                name: "Grace Hopper".to_owned(),
                email: Email::parse("grace@example.com").unwrap(),
                address: serde_json::json!({}),
            },
            Currency::usd(),
            Money::from_minor(500),
            vec![NewOrderItem {
                product_id: product.id,
                product_name: product.name.clone(),
                quantity,
                price_at_time: product.price,
            }],
        )
        .unwrap()
    }

    fn plan(from: OrderStatus, to: OrderStatus) -> TransitionPlan {
        match from.plan_to(to).unwrap() {
            Planned::Move(plan) => plan,
            Planned::AlreadyThere => panic!("expected a move"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let store = MemoryStore::new();
        store.create_product(&input("Dragon", 1)).await.unwrap();
        let err = store.create_product(&input("dragon", 1)).await.unwrap_err();
        assert!(err.is_conflict_on(PRODUCT_SLUG_KEY));
    }

    #[tokio::test]
    async fn test_order_number_collision_conflicts() {
        let store = MemoryStore::new();
        let product = store.create_product(&input("Dragon", 5)).await.unwrap();
        let first = new_order(&product, 1);
        store.insert_order(&first).await.unwrap();

        let mut second = new_order(&product, 1);
        second.order_number = first.order_number.clone();
        let err = store.insert_order(&second).await.unwrap_err();
        assert!(err.is_conflict_on(ORDER_NUMBER_KEY));
        assert!(store.get_order(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_payment_reference_is_write_once() {
        let store = MemoryStore::new();
        let product = store.create_product(&input("Dragon", 5)).await.unwrap();
        let order = store.insert_order(&new_order(&product, 1)).await.unwrap();

        store.attach_payment_reference(order.id, "pi_1").await.unwrap();
        assert!(store.attach_payment_reference(order.id, "pi_2").await.is_err());

        let found = store.find_by_payment_reference("pi_1").await.unwrap().unwrap();
        assert_eq!(found.id, order.id);
        assert!(store.find_by_payment_reference("pi_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let store = MemoryStore::new();
        let product = store.create_product(&input("Dragon", 5)).await.unwrap();
        let order = store.insert_order(&new_order(&product, 2)).await.unwrap();
        let pay = plan(OrderStatus::Pending, OrderStatus::Paid);

        let first = store.apply_transition(order.id, &pay).await.unwrap();
        assert!(matches!(first, TransitionOutcome::Applied { ref order, .. } if order.confirmation_sent));
        let second = store.apply_transition(order.id, &pay).await.unwrap();
        assert!(matches!(second, TransitionOutcome::Stale(_)));

        let stock = store.get_product(product.id).await.unwrap().unwrap().stock;
        assert_eq!(stock, 3);
    }

    #[tokio::test]
    async fn test_delete_product_unlinks_items_and_restore_skips() {
        let store = MemoryStore::new();
        let product = store.create_product(&input("Dragon", 5)).await.unwrap();
        let order = store.insert_order(&new_order(&product, 2)).await.unwrap();
        store
            .apply_transition(order.id, &plan(OrderStatus::Pending, OrderStatus::Paid))
            .await
            .unwrap();

        store.delete_product(product.id).await.unwrap();
        let order = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(order.items[0].product_id, None);
        assert_eq!(order.items[0].product_name, "Dragon");

        let outcome = store
            .apply_transition(order.id, &plan(OrderStatus::Paid, OrderStatus::Cancelled))
            .await
            .unwrap();
        let TransitionOutcome::Applied { stock, .. } = outcome else {
            panic!("cancel should apply");
        };
        assert!(stock.adjustments.is_empty());
        assert_eq!(stock.skipped, 1);
    }

    #[tokio::test]
    async fn test_update_product_moves_slug() {
        let store = MemoryStore::new();
        let product = store.create_product(&input("Dragon", 5)).await.unwrap();
        let mut edit = input("Big Dragon", 9);
        edit.price = Money::from_minor(1500);

        let updated = store.update_product(product.id, &edit).await.unwrap();
        assert_eq!(updated.slug, "big-dragon");
        assert_eq!(updated.stock, 9);

        // The old slug is free again.
        store.create_product(&input("Dragon", 1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_low_stock_is_visible_strict_and_limited() {
        let store = MemoryStore::new();
        store.create_product(&input("At Threshold", 5)).await.unwrap();
        store.create_product(&input("Plenty", 40)).await.unwrap();
        store
            .create_product(&ProductInput {
                visible: false,
                ..input("Hidden", 0)
            })
            .await
            .unwrap();
        for (i, stock) in [4, 0, 2, 1, 3].into_iter().enumerate() {
            store.create_product(&input(&format!("Low {i}"), stock)).await.unwrap();
        }

        let low = store.low_stock(5, 10).await.unwrap();
        let stocks: Vec<u32> = low.iter().map(|p| p.stock).collect();
        assert_eq!(stocks, vec![0, 1, 2, 3, 4]);

        assert_eq!(store.low_stock(5, 2).await.unwrap().len(), 2);
        assert_eq!(store.product_count().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_settings_default_then_update() {
        let store = MemoryStore::new();
        assert_eq!(store.get_settings().await.unwrap(), ShopSettings::default());

        let mut settings = ShopSettings::default();
        settings.shipping_fee = Money::from_minor(0);
        store.update_settings(&settings).await.unwrap();
        assert_eq!(store.get_settings().await.unwrap().shipping_fee, Money::ZERO);
    }
}

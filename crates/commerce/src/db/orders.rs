//! Order queries and the transactional status compare-and-set.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use print_shop_core::{
    Currency, Email, Money, OrderId, OrderItemId, OrderNumber, OrderStatus, ProductId,
    SideEffect, TransitionPlan,
};

use super::stock::apply_movement;
use super::{PgStore, RepositoryError, map_unique_violation};
use crate::ledger::{StockMovement, StockReport, stock_lines, unlinked_items};
use crate::models::{CustomerDetails, NewOrder, Order, OrderItem, OrderStats};
use crate::store::{OrderStore, TransitionOutcome};

const ORDER_COLUMNS: &str = "id, order_number, status, customer_name, customer_email, \
     shipping_address, currency, subtotal, shipping_cost, total, payment_reference, \
     confirmation_sent, shipping_notified, created_at, updated_at";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: OrderNumber,
    status: OrderStatus,
    customer_name: String,
    customer_email: Email,
    shipping_address: serde_json::Value,
    currency: Currency,
    subtotal: Money,
    shipping_cost: Money,
    total: Money,
    payment_reference: Option<String>,
    confirmation_sent: bool,
    shipping_notified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            order_number: self.order_number,
            status: self.status,
            customer: CustomerDetails {
                name: self.customer_name,
                email: self.customer_email,
                address: self.shipping_address,
            },
            currency: self.currency,
            subtotal: self.subtotal,
            shipping_cost: self.shipping_cost,
            total: self.total,
            payment_reference: self.payment_reference,
            confirmation_sent: self.confirmation_sent,
            shipping_notified: self.shipping_notified,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: Option<ProductId>,
    product_name: String,
    quantity: i32,
    price_at_time: Money,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!("invalid quantity on order item {}", row.id))
        })?;
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity,
            price_at_time: row.price_at_time,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn fetch_items(
    conn: &mut PgConnection,
    order_ids: &[OrderId],
) -> Result<HashMap<OrderId, Vec<OrderItem>>, RepositoryError> {
    let uuids: Vec<uuid::Uuid> = order_ids.iter().map(OrderId::as_uuid).collect();
    let rows = sqlx::query_as::<_, OrderItemRow>(
        "SELECT id, order_id, product_id, product_name, quantity, price_at_time \
         FROM order_item WHERE order_id = ANY($1) ORDER BY order_id, position",
    )
    .bind(&uuids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
    for row in rows {
        let item = OrderItem::try_from(row)?;
        items.entry(item.order_id).or_default().push(item);
    }
    Ok(items)
}

async fn attach_items(
    conn: &mut PgConnection,
    rows: Vec<OrderRow>,
) -> Result<Vec<Order>, RepositoryError> {
    let ids: Vec<OrderId> = rows.iter().map(|row| row.id).collect();
    let mut items = fetch_items(conn, &ids).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let order_items = items.remove(&row.id).unwrap_or_default();
            row.into_order(order_items)
        })
        .collect())
}

async fn fetch_one_where(
    conn: &mut PgConnection,
    condition: &str,
    bind: impl for<'q> sqlx::Encode<'q, sqlx::Postgres> + sqlx::Type<sqlx::Postgres> + Send + 'static,
) -> Result<Option<Order>, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE {condition}"
    ))
    .bind(bind)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    Ok(attach_items(conn, vec![row]).await?.pop())
}

// =============================================================================
// Repository
// =============================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        let order = Order::from_new(new, Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, order_number, status, customer_name, customer_email, \
             shipping_address, currency, subtotal, shipping_cost, total, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.status)
        .bind(&order.customer.name)
        .bind(&order.customer.email)
        .bind(&order.customer.address)
        .bind(&order.currency)
        .bind(order.subtotal)
        .bind(order.shipping_cost)
        .bind(order.total)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| RepositoryError::DataCorruption("too many order items".to_string()))?;
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::DataCorruption(format!("quantity {} out of range", item.quantity))
            })?;

            sqlx::query(
                "INSERT INTO order_item (id, order_id, product_id, product_name, quantity, \
                 price_at_time, position) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(quantity)
            .bind(item.price_at_time)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn attach_payment_reference(
        &self,
        id: OrderId,
        reference: &str,
    ) -> Result<Order, RepositoryError> {
        let updated: Option<OrderId> = sqlx::query_scalar(
            "UPDATE orders SET payment_reference = $2, updated_at = NOW() \
             WHERE id = $1 AND payment_reference IS NULL AND status = $3 \
             RETURNING id",
        )
        .bind(id)
        .bind(reference)
        .bind(OrderStatus::Pending)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        let order = self.get_order(id).await?.ok_or(RepositoryError::NotFound)?;
        if updated.is_none() {
            return Err(RepositoryError::Conflict(
                "payment reference already set or order not pending".to_string(),
            ));
        }
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_one_where(&mut conn, "id = $1", id).await
    }

    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_one_where(&mut conn, "order_number = $1", number.as_str().to_string()).await
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_one_where(&mut conn, "payment_reference = $1", reference.to_string()).await
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY created_at DESC"
        ))
        .bind(status.map(OrderStatus::as_str))
        .fetch_all(&mut *conn)
        .await?;

        attach_items(&mut conn, rows).await
    }

    async fn apply_transition(
        &self,
        id: OrderId,
        plan: &TransitionPlan,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Row lock plus re-check of the WHERE clause: one concurrent caller wins.
        let updated: Option<OrderId> = sqlx::query_scalar(
            "UPDATE orders SET status = $3, \
             confirmation_sent = confirmation_sent OR $4, \
             shipping_notified = shipping_notified OR $5, \
             updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING id",
        )
        .bind(id)
        .bind(plan.from)
        .bind(plan.to)
        .bind(plan.has(SideEffect::SendConfirmation))
        .bind(plan.has(SideEffect::SendShippingUpdate))
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            tx.rollback().await?;
            let current = self.get_order(id).await?.ok_or(RepositoryError::NotFound)?;
            return Ok(TransitionOutcome::Stale(current));
        }

        let order = fetch_one_where(&mut tx, "id = $1", id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let stock = match StockMovement::for_plan(plan) {
            Some(movement) => {
                let mut report =
                    apply_movement(&mut tx, movement, &stock_lines(&order.items)).await?;
                report.skipped += unlinked_items(&order.items);
                report
            }
            None => StockReport::default(),
        };

        tx.commit().await?;
        Ok(TransitionOutcome::Applied { order, stock })
    }

    async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let (revenue, order_count, pending_count): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
               COALESCE(SUM(total) FILTER (WHERE status NOT IN ('PENDING', 'CANCELLED')), 0)::BIGINT, \
               COUNT(*), \
               COUNT(*) FILTER (WHERE status = 'PENDING') \
             FROM orders",
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |n: i64| {
            u64::try_from(n).map_err(|_| RepositoryError::DataCorruption(format!("negative count {n}")))
        };
        Ok(OrderStats {
            revenue: Money::from_minor(revenue),
            order_count: count(order_count)?,
            pending_count: count(pending_count)?,
        })
    }
}

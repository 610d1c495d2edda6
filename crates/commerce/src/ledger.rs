//! Stock ledger arithmetic.
//!
//! Stock changes only as a side effect of an order transition: decrement on
//! payment, restore on cancel or refund. Stores apply a [`StockMovement`] to
//! each product row atomically and in the same unit of work as the status
//! change; this module holds the arithmetic they share so the in-memory and
//! `PostgreSQL` stores cannot drift apart.

use serde::Serialize;

use print_shop_core::{ProductId, SideEffect, TransitionPlan};

use crate::models::OrderItem;

/// Direction of a stock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMovement {
    /// Subtract quantities, flooring at zero.
    Decrement,
    /// Add quantities back.
    Restore,
}

impl StockMovement {
    /// The movement a transition carries, if any.
    #[must_use]
    pub fn for_plan(plan: &TransitionPlan) -> Option<Self> {
        if plan.has(SideEffect::DecrementStock) {
            Some(Self::Decrement)
        } else if plan.has(SideEffect::RestoreStock) {
            Some(Self::Restore)
        } else {
            None
        }
    }

    /// New stock level after moving `quantity` units.
    #[must_use]
    pub const fn apply(self, current: u32, quantity: u32) -> u32 {
        match self {
            Self::Decrement => current.saturating_sub(quantity),
            Self::Restore => current.saturating_add(quantity),
        }
    }
}

/// Quantity of one product to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLine {
    /// Product to adjust.
    pub product_id: ProductId,
    /// Units to move.
    pub quantity: u32,
}

/// Collapse an order's items into one line per product.
///
/// Items whose product has been deleted are dropped; restoring or decrementing
/// them is a no-op. [`unlinked_items`] counts them.
#[must_use]
pub fn stock_lines(items: &[OrderItem]) -> Vec<StockLine> {
    let mut lines: Vec<StockLine> = Vec::with_capacity(items.len());
    for item in items {
        let Some(product_id) = item.product_id else {
            continue;
        };
        match lines.iter_mut().find(|line| line.product_id == product_id) {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
            None => lines.push(StockLine {
                product_id,
                quantity: item.quantity,
            }),
        }
    }
    // Fixed row order across concurrent transactions.
    lines.sort_by_key(|line| line.product_id);
    lines
}

/// Items whose product has been deleted.
#[must_use]
pub fn unlinked_items(items: &[OrderItem]) -> usize {
    items.iter().filter(|item| item.product_id.is_none()).count()
}

/// What happened to one product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockAdjustment {
    /// Adjusted product.
    pub product_id: ProductId,
    /// Direction.
    pub movement: StockMovement,
    /// Units requested.
    pub requested: u32,
    /// Stock before the change.
    pub before: u32,
    /// Stock after the change.
    pub after: u32,
}

impl StockAdjustment {
    /// Compute the adjustment of `line` against the current stock level.
    #[must_use]
    pub const fn compute(movement: StockMovement, line: StockLine, before: u32) -> Self {
        Self {
            product_id: line.product_id,
            movement,
            requested: line.quantity,
            before,
            after: movement.apply(before, line.quantity),
        }
    }

    /// Units that could not be decremented because stock ran out.
    #[must_use]
    pub const fn shortfall(&self) -> u32 {
        match self.movement {
            StockMovement::Decrement => self.requested.saturating_sub(self.before),
            StockMovement::Restore => 0,
        }
    }
}

/// Every adjustment made for one transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StockReport {
    /// Adjustments, one per existing product.
    pub adjustments: Vec<StockAdjustment>,
    /// Items whose product no longer exists.
    pub skipped: usize,
}

impl StockReport {
    /// Decrements that hit the zero floor.
    pub fn oversold(&self) -> impl Iterator<Item = &StockAdjustment> {
        self.adjustments.iter().filter(|adj| adj.shortfall() > 0)
    }

    /// Whether any decrement hit the zero floor.
    #[must_use]
    pub fn is_oversold(&self) -> bool {
        self.oversold().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use print_shop_core::{Money, OrderId, OrderItemId};

    fn item(product_id: Option<ProductId>, quantity: u32) -> OrderItem {
        OrderItem {
            id: OrderItemId::generate(),
            order_id: OrderId::generate(),
            product_id,
            product_name: "Vase".to_owned(),
            quantity,
            price_at_time: Money::from_minor(1000),
        }
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        assert_eq!(StockMovement::Decrement.apply(5, 2), 3);
        assert_eq!(StockMovement::Decrement.apply(1, 3), 0);
        assert_eq!(StockMovement::Restore.apply(0, 3), 3);
        assert_eq!(StockMovement::Restore.apply(u32::MAX, 1), u32::MAX);
    }

    #[test]
    fn test_movement_for_plan() {
        use print_shop_core::{OrderStatus, Planned};

        let movement = |from: OrderStatus, to: OrderStatus| match from.plan_to(to) {
            Ok(Planned::Move(plan)) => StockMovement::for_plan(&plan),
            other => panic!("unexpected plan {other:?}"),
        };
        assert_eq!(movement(OrderStatus::Pending, OrderStatus::Paid), Some(StockMovement::Decrement));
        assert_eq!(movement(OrderStatus::Paid, OrderStatus::Cancelled), Some(StockMovement::Restore));
        assert_eq!(movement(OrderStatus::Shipped, OrderStatus::Refunded), Some(StockMovement::Restore));
        assert_eq!(movement(OrderStatus::Pending, OrderStatus::Cancelled), None);
        assert_eq!(movement(OrderStatus::Paid, OrderStatus::Shipped), None);
    }

    #[test]
    fn test_shortfall_only_on_decrement() {
        let line = StockLine {
            product_id: ProductId::generate(),
            quantity: 4,
        };
        let short = StockAdjustment::compute(StockMovement::Decrement, line, 1);
        assert_eq!(short.after, 0);
        assert_eq!(short.shortfall(), 3);

        let restore = StockAdjustment::compute(StockMovement::Restore, line, 1);
        assert_eq!(restore.after, 5);
        assert_eq!(restore.shortfall(), 0);
    }

    #[test]
    fn test_lines_merge_and_skip_deleted() {
        let a = ProductId::generate();
        let b = ProductId::generate();
        let items = [item(Some(a), 1), item(None, 7), item(Some(b), 2), item(Some(a), 3)];

        let lines = stock_lines(&items);
        assert_eq!(lines.len(), 2);
        assert_eq!(unlinked_items(&items), 1);
        let qty_a = lines.iter().find(|l| l.product_id == a).map(|l| l.quantity);
        assert_eq!(qty_a, Some(4));
        assert!(lines.windows(2).all(|w| w[0].product_id <= w[1].product_id));
    }

    #[test]
    fn test_report_oversold() {
        let line = StockLine {
            product_id: ProductId::generate(),
            quantity: 2,
        };
        let mut report = StockReport::default();
        report
            .adjustments
            .push(StockAdjustment::compute(StockMovement::Decrement, line, 5));
        assert!(!report.is_oversold());

        report
            .adjustments
            .push(StockAdjustment::compute(StockMovement::Decrement, line, 1));
        assert_eq!(report.oversold().count(), 1);
    }
}

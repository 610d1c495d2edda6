//! Order lifecycle: the transition table and its side effects.
//!
//! ```text
//! PENDING   ──payment──▶ PAID       decrement stock, confirmation email
//! PENDING   ──cancel───▶ CANCELLED
//! PAID      ──cancel───▶ CANCELLED  restore stock
//! PAID      ──ship─────▶ SHIPPED    shipping email
//! SHIPPED   ──deliver──▶ DELIVERED
//! PAID | SHIPPED | DELIVERED ──refund──▶ REFUNDED   gateway refund, restore stock
//! ```
//!
//! [`plan_transition`] is pure: it says whether a move is allowed and which
//! side effects it carries. Stores apply the status change with a
//! compare-and-set on the `from` state, so a plan computed from a stale read
//! simply fails to apply instead of running its side effects twice.

use serde::Serialize;

use crate::types::OrderStatus;

/// A side effect attached to a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Subtract every line item's quantity from its product's stock.
    DecrementStock,
    /// Add every line item's quantity back to its product's stock.
    RestoreStock,
    /// Send the order confirmation email and set `confirmation_sent`.
    SendConfirmation,
    /// Send the shipping email and set `shipping_notified`.
    SendShippingUpdate,
    /// Refund the payment through the gateway before committing.
    IssueRefund,
}

/// An allowed move between two distinct states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    /// State the order must be in for the move to apply.
    pub from: OrderStatus,
    /// State the order ends up in.
    pub to: OrderStatus,
    /// Side effects, in the order they must run.
    pub effects: &'static [SideEffect],
}

impl TransitionPlan {
    /// Whether the plan carries the given side effect.
    #[must_use]
    pub fn has(&self, effect: SideEffect) -> bool {
        self.effects.contains(&effect)
    }
}

/// Outcome of planning a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Planned {
    /// The order is already in the requested state; report success, do nothing.
    AlreadyThere,
    /// Apply the move.
    Move(TransitionPlan),
}

/// A requested move that the table does not allow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid transition from {from} to {to}")]
pub struct InvalidTransition {
    /// The order's current state.
    pub from: OrderStatus,
    /// The requested state.
    pub to: OrderStatus,
}

const PAY: &[SideEffect] = &[SideEffect::DecrementStock, SideEffect::SendConfirmation];
const CANCEL_UNPAID: &[SideEffect] = &[];
const CANCEL_PAID: &[SideEffect] = &[SideEffect::RestoreStock];
const SHIP: &[SideEffect] = &[SideEffect::SendShippingUpdate];
const DELIVER: &[SideEffect] = &[];
const REFUND: &[SideEffect] = &[SideEffect::IssueRefund, SideEffect::RestoreStock];

/// Plan the move of an order from `from` to `to`.
///
/// Requesting the current state is always accepted as [`Planned::AlreadyThere`],
/// which is what makes redelivered payment events and repeated operator clicks
/// harmless.
///
/// # Errors
///
/// Returns [`InvalidTransition`] for any pair not in the table.
pub const fn plan_transition(
    from: OrderStatus,
    to: OrderStatus,
) -> Result<Planned, InvalidTransition> {
    use OrderStatus::{Cancelled, Delivered, Paid, Pending, Refunded, Shipped};

    let effects: &'static [SideEffect] = match (from, to) {
        (Pending, Pending)
        | (Paid, Paid)
        | (Shipped, Shipped)
        | (Delivered, Delivered)
        | (Cancelled, Cancelled)
        | (Refunded, Refunded) => return Ok(Planned::AlreadyThere),
        (Pending, Paid) => PAY,
        (Pending, Cancelled) => CANCEL_UNPAID,
        (Paid, Cancelled) => CANCEL_PAID,
        (Paid, Shipped) => SHIP,
        (Shipped, Delivered) => DELIVER,
        (Paid | Shipped | Delivered, Refunded) => REFUND,
        _ => return Err(InvalidTransition { from, to }),
    };

    Ok(Planned::Move(TransitionPlan { from, to, effects }))
}

impl OrderStatus {
    /// Plan a move from this state; see [`plan_transition`].
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for any pair not in the table.
    pub const fn plan_to(self, to: Self) -> Result<Planned, InvalidTransition> {
        plan_transition(self, to)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use OrderStatus::{Cancelled, Delivered, Paid, Pending, Refunded, Shipped};

    fn moves(from: OrderStatus, to: OrderStatus) -> TransitionPlan {
        match plan_transition(from, to).unwrap() {
            Planned::Move(plan) => plan,
            Planned::AlreadyThere => panic!("{from} -> {to} should move"),
        }
    }

    #[test]
    fn test_payment_decrements_and_confirms() {
        let plan = moves(Pending, Paid);
        assert_eq!(
            plan.effects,
            &[SideEffect::DecrementStock, SideEffect::SendConfirmation]
        );
    }

    #[test]
    fn test_cancel_restores_only_when_paid() {
        assert!(moves(Pending, Cancelled).effects.is_empty());
        assert!(moves(Paid, Cancelled).has(SideEffect::RestoreStock));
    }

    #[test]
    fn test_refund_from_every_paid_state() {
        for from in [Paid, Shipped, Delivered] {
            let plan = moves(from, Refunded);
            assert_eq!(plan.effects.first(), Some(&SideEffect::IssueRefund));
            assert!(plan.has(SideEffect::RestoreStock));
        }
    }

    #[test]
    fn test_ship_notifies() {
        assert!(moves(Paid, Shipped).has(SideEffect::SendShippingUpdate));
        assert!(moves(Shipped, Delivered).effects.is_empty());
    }

    #[test]
    fn test_same_state_is_noop_everywhere() {
        for status in OrderStatus::ALL {
            assert_eq!(plan_transition(status, status), Ok(Planned::AlreadyThere));
        }
    }

    #[test]
    fn test_rejected_pairs() {
        let rejected = [
            (Delivered, Paid),
            (Pending, Shipped),
            (Pending, Refunded),
            (Pending, Delivered),
            (Shipped, Cancelled),
            (Shipped, Paid),
            (Cancelled, Paid),
            (Cancelled, Refunded),
            (Refunded, Paid),
            (Refunded, Cancelled),
            (Paid, Pending),
            (Delivered, Shipped),
        ];
        for (from, to) in rejected {
            assert_eq!(
                plan_transition(from, to),
                Err(InvalidTransition { from, to }),
                "{from} -> {to} should be rejected"
            );
        }
    }

    #[test]
    fn test_table_is_exhaustive() {
        let mut allowed = 0;
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if matches!(plan_transition(from, to), Ok(Planned::Move(_))) {
                    allowed += 1;
                }
            }
        }
        assert_eq!(allowed, 8);
    }
}

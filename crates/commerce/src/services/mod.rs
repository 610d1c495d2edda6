//! The three order lifecycle services.
//!
//! - [`CheckoutService`] - cart to `PENDING` order plus payment intent
//! - [`WebhookReconciler`] - payment events to `PAID`, exactly once
//! - [`TransitionService`] - operator moves: cancel, ship, deliver, refund
//!
//! Services hold their collaborators as trait objects and receive shop
//! settings per call.

mod checkout;
mod reconciler;
mod transitions;

pub use checkout::{
    CartLine, CheckoutError, CheckoutReceipt, CheckoutRequest, CheckoutService, CustomerInput,
};
pub use reconciler::{ReconcileOutcome, WebhookError, WebhookReconciler};
pub use transitions::{TransitionError, TransitionReport, TransitionService};

#[cfg(test)]
mod test_support;

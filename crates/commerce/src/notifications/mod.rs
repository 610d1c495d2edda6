//! Customer and operator notifications.
//!
//! Services hand a [`Notification`] to a [`Notifier`] and move on: dispatch
//! never waits for delivery and its outcome never feeds back into order
//! state. [`NotificationDispatcher`] is the production notifier; it queues
//! notifications for a background worker that renders and mails them.

mod dispatcher;
mod email;
mod templates;

use print_shop_core::{Email, OrderNumber};

use crate::ledger::StockAdjustment;
use crate::models::{Order, ShopSettings};

pub use dispatcher::{NotificationDispatcher, QUEUE_CAPACITY};
pub use email::{EmailError, LogMailer, Mailer, OutgoingEmail, SmtpMailer};
pub use templates::render;

/// A message to deliver, carrying everything needed to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Payment received.
    OrderConfirmation {
        /// The paid order.
        order: Order,
        /// Shop settings at the time of payment.
        shop: ShopSettings,
    },
    /// Order handed to the carrier.
    ShippingUpdate {
        /// The shipped order.
        order: Order,
        /// Shop settings at the time of shipping.
        shop: ShopSettings,
    },
    /// Stock ran short when a paid order was decremented.
    OversoldAlert {
        /// The order whose payment hit the zero floor.
        order: Order,
        /// Operator address.
        to: Email,
        /// Decrements that could not be fully applied.
        shortfalls: Vec<StockAdjustment>,
    },
}

impl Notification {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderConfirmation { .. } => "order_confirmation",
            Self::ShippingUpdate { .. } => "shipping_update",
            Self::OversoldAlert { .. } => "oversold_alert",
        }
    }

    /// The order this notification is about.
    #[must_use]
    pub const fn order(&self) -> &Order {
        match self {
            Self::OrderConfirmation { order, .. }
            | Self::ShippingUpdate { order, .. }
            | Self::OversoldAlert { order, .. } => order,
        }
    }

    /// Order number of the order this notification is about.
    #[must_use]
    pub const fn order_number(&self) -> &OrderNumber {
        &self.order().order_number
    }
}

/// Fire-and-forget notification sink.
///
/// `dispatch` must return promptly and must not fail; implementations log
/// anything they cannot deliver.
pub trait Notifier: Send + Sync {
    /// Queue a notification for delivery.
    fn dispatch(&self, notification: Notification);

    /// Queue the order confirmation email.
    fn send_confirmation(&self, order: &Order, shop: &ShopSettings) {
        self.dispatch(Notification::OrderConfirmation {
            order: order.clone(),
            shop: shop.clone(),
        });
    }

    /// Queue the shipping email.
    fn send_shipping_update(&self, order: &Order, shop: &ShopSettings) {
        self.dispatch(Notification::ShippingUpdate {
            order: order.clone(),
            shop: shop.clone(),
        });
    }

    /// Queue an oversold alert to the operator.
    fn send_oversold_alert(&self, order: &Order, to: &Email, shortfalls: Vec<StockAdjustment>) {
        self.dispatch(Notification::OversoldAlert {
            order: order.clone(),
            to: to.clone(),
            shortfalls,
        });
    }
}

//! Bounded queue plus one background delivery worker.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{Mailer, Notification, Notifier, render};

/// Notifications buffered before new ones are dropped.
pub const QUEUE_CAPACITY: usize = 256;

/// Queues notifications for asynchronous delivery.
///
/// Cloning shares the queue. The worker exits once every clone is dropped
/// and the queue has drained, so awaiting its handle after shutdown flushes
/// pending mail.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Start the worker with the default queue size.
    #[must_use]
    pub fn spawn(mailer: Arc<dyn Mailer>) -> (Self, JoinHandle<()>) {
        Self::with_capacity(mailer, QUEUE_CAPACITY)
    }

    /// Start the worker with a custom queue size.
    #[must_use]
    pub fn with_capacity(mailer: Arc<dyn Mailer>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(rx, mailer));
        (Self { tx }, handle)
    }
}

impl Notifier for NotificationDispatcher {
    fn dispatch(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => warn!(
                kind = dropped.kind(),
                order_number = %dropped.order_number(),
                "Notification queue full, dropping notification"
            ),
            Err(TrySendError::Closed(dropped)) => error!(
                kind = dropped.kind(),
                order_number = %dropped.order_number(),
                "Notification worker stopped, dropping notification"
            ),
        }
    }
}

async fn run(mut rx: mpsc::Receiver<Notification>, mailer: Arc<dyn Mailer>) {
    while let Some(notification) = rx.recv().await {
        deliver(mailer.as_ref(), &notification).await;
    }
    info!("Notification worker stopped");
}

async fn deliver(mailer: &dyn Mailer, notification: &Notification) {
    let kind = notification.kind();
    let order_number = notification.order_number();

    let email = match render(notification) {
        Ok(email) => email,
        Err(e) => {
            error!(kind, %order_number, error = %e, "Failed to render notification");
            return;
        }
    };

    match mailer.send(&email).await {
        Ok(()) => info!(kind, %order_number, to = %email.to, "Notification sent"),
        Err(e) => error!(
            kind,
            %order_number,
            to = %email.to,
            error = %e,
            "Failed to send notification"
        ),
    }
}

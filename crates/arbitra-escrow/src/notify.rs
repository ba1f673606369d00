//! Notification channel
//!
//! Observers learn about every committed ledger change, in commit order.
//! Registered handlers are invoked synchronously by the ledger while the
//! commit sequencer is held; `stream()` additionally offers a broadcast
//! receiver for asynchronous consumers.
//!
//! Handler failures (errors and panics) are contained here: they are logged
//! and counted, and never reach the mutation that triggered them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use arbitra_types::{Notification, SubscriptionId};

/// Default capacity of the broadcast stream
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 1024;

/// Failure reported by a notification handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receiver of ledger notifications
pub trait NotificationHandler: Send + Sync {
    fn handle(&self, notification: &Notification) -> Result<(), HandlerError>;
}

impl<F> NotificationHandler for F
where
    F: Fn(&Notification) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, notification: &Notification) -> Result<(), HandlerError> {
        self(notification)
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn NotificationHandler>,
}

/// Delivery statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub published: u64,
    pub handler_failures: u64,
    pub subscribers: usize,
}

/// Fan-out of committed notifications to subscribers
pub struct NotificationChannel {
    subscriptions: RwLock<Vec<Subscription>>,
    sender: broadcast::Sender<Notification>,
    published: AtomicU64,
    handler_failures: AtomicU64,
}

impl NotificationChannel {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            subscriptions: RwLock::new(Vec::new()),
            sender,
            published: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
        }
    }

    /// Register `handler` for every future notification
    ///
    /// Registering the same handler instance again returns its existing id.
    pub fn subscribe(&self, handler: Arc<dyn NotificationHandler>) -> SubscriptionId {
        let mut subscriptions = self.subscriptions.write();
        if let Some(existing) = subscriptions
            .iter()
            .find(|s| same_handler(&s.handler, &handler))
        {
            return existing.id.clone();
        }

        let id = SubscriptionId::new();
        subscriptions.push(Subscription {
            id: id.clone(),
            handler,
        });
        debug!(subscription = %id, "Handler subscribed");
        id
    }

    /// Register a closure as a handler
    pub fn subscribe_fn<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(handler))
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| &s.id != id);
        let removed = subscriptions.len() != before;
        if removed {
            debug!(subscription = %id, "Handler unsubscribed");
        }
        removed
    }

    /// Receiver of all notifications published from now on
    ///
    /// A receiver that falls more than the buffer behind skips the oldest
    /// items; it never sees them out of order.
    pub fn stream(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Deliver `notification` to every handler, then to the stream
    pub fn publish(&self, notification: &Notification) {
        let handlers: Vec<(SubscriptionId, Arc<dyn NotificationHandler>)> = self
            .subscriptions
            .read()
            .iter()
            .map(|s| (s.id.clone(), s.handler.clone()))
            .collect();

        for (id, handler) in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(notification)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };
            if let Some(error) = failure {
                self.handler_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    subscription = %id,
                    sequence = notification.sequence,
                    error = %error,
                    "Notification handler failed"
                );
            }
        }

        // No receivers is not an error
        let _ = self.sender.send(notification.clone());
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            published: self.published.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            subscribers: self.subscriptions.read().len(),
        }
    }
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_BUFFER)
    }
}

/// Compare handler instances by data pointer, ignoring vtables
fn same_handler(a: &Arc<dyn NotificationHandler>, b: &Arc<dyn NotificationHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

//! Explicit fan-out of entitlement changes to registered observers.
//!
//! Publishing enqueues the event on every live subscription before `publish`
//! returns, so a caller that publishes and then returns has already delivered.
//! Subscriptions created after a publish never observe it.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

const NOTIFIER_CAPACITY: usize = 64;

pub struct EntitlementNotifier {
    sender: broadcast::Sender<bool>,
    next_subscription_id: AtomicU64,
}

impl Default for EntitlementNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl EntitlementNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTIFIER_CAPACITY);
        Self {
            sender,
            next_subscription_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> EntitlementSubscription {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        debug!(subscription = id, "notifier: observer registered");
        EntitlementSubscription {
            id,
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the number of subscriptions the event was delivered to.
    pub fn publish(&self, subscribed: bool) -> usize {
        match self.sender.send(subscribed) {
            Ok(delivered) => {
                debug!(subscribed, delivered, "notifier: entitlement published");
                delivered
            }
            Err(_) => {
                debug!(subscribed, "notifier: no observers registered");
                0
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Dropping the subscription unregisters the observer.
pub struct EntitlementSubscription {
    id: u64,
    receiver: broadcast::Receiver<bool>,
}

impl EntitlementSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits for the next entitlement change. `None` once the notifier is gone.
    pub async fn recv(&mut self) -> Option<bool> {
        loop {
            match self.receiver.recv().await {
                Ok(subscribed) => return Some(subscribed),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(subscription = self.id, skipped, "notifier: observer lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<bool> {
        loop {
            match self.receiver.try_recv() {
                Ok(subscribed) => return Some(subscribed),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(subscription = self.id, skipped, "notifier: observer lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<bool> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

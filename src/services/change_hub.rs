//! In-process fan-out of change notifications to filtered subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::services::backend::{Subscription, SubscriptionId};
use crate::types::event::{ChangeEvent, ChangeFilter};

struct Subscriber {
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

/// Registry of live subscriptions keyed by id.
pub struct ChangeHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, events) = mpsc::unbounded_channel();
        self.registry().insert(id, Subscriber { filter, tx });
        Subscription { id, events }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry().remove(&id).is_some()
    }

    /// Sends `event` to every subscriber whose filter matches the changed row.
    /// Subscribers whose receiver is gone are pruned. Returns the number notified.
    pub fn publish(&self, table: &str, owner: &str, event: &ChangeEvent) -> usize {
        let mut registry = self.registry();
        let mut delivered = 0;
        registry.retain(|_, sub| {
            if !sub.filter.matches(table, owner) {
                return true;
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        delivered
    }

    /// Sends `event` to one subscriber. Returns false if it is gone.
    pub fn notify(&self, id: SubscriptionId, event: ChangeEvent) -> bool {
        let mut registry = self.registry();
        let sent = match registry.get(&id) {
            Some(sub) => sub.tx.send(event).is_ok(),
            None => return false,
        };
        if !sent {
            registry.remove(&id);
        }
        sent
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

//! Notification Hub - per-order publish/subscribe
//!
//! Observers register for one order id and receive every state delta
//! broadcast for it after they joined. There is no replay of earlier deltas.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{OrderPatch, OrderStatus, OrderUpdate};

/// Per-observer buffer; a full buffer drops deltas for that observer only
pub const DEFAULT_OBSERVER_BUFFER: usize = 64;

/// Live handle of one observer
#[derive(Debug)]
pub struct Subscription {
    order_id: Uuid,
    id: u64,
    receiver: mpsc::Receiver<Arc<OrderUpdate>>,
}

impl Subscription {
    pub fn order_id(&self) -> Uuid {
        self.order_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next delta; `None` once the hub has dropped this observer
    pub async fn recv(&mut self) -> Option<Arc<OrderUpdate>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<OrderUpdate>> {
        self.receiver.try_recv().ok()
    }
}

pub struct NotificationHub {
    observers: DashMap<Uuid, HashMap<u64, mpsc::Sender<Arc<OrderUpdate>>>>,
    next_id: AtomicU64,
    buffer: usize,
    closed: AtomicBool,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_BUFFER)
    }
}

impl NotificationHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            observers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self, order_id: Uuid) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.buffer);

        // After close the sender is dropped here, so the observer sees end-of-stream
        if !self.closed.load(Ordering::Acquire) {
            self.observers.entry(order_id).or_default().insert(id, tx);
            debug!(%order_id, observer = id, "Observer subscribed");
        }

        Subscription {
            order_id,
            id,
            receiver,
        }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.unsubscribe_id(subscription.order_id, subscription.id);
    }

    pub fn unsubscribe_id(&self, order_id: Uuid, observer: u64) {
        if let Entry::Occupied(mut entry) = self.observers.entry(order_id) {
            entry.get_mut().remove(&observer);
            if entry.get().is_empty() {
                entry.remove();
            }
            debug!(%order_id, observer, "Observer unsubscribed");
        }
    }

    /// Push a persisted transition to every observer of `order_id`.
    /// Returns the number of observers the delta was handed to.
    pub fn broadcast(&self, order_id: Uuid, status: OrderStatus, patch: &OrderPatch) -> usize {
        self.publish(OrderUpdate::transition(order_id, status, patch))
    }

    /// Deliver one payload to every observer of its order id without waiting.
    /// Stale observers are pruned; full observers skip this delta.
    pub fn publish(&self, update: OrderUpdate) -> usize {
        let order_id = update.order_id;
        let payload = Arc::new(update);

        let Entry::Occupied(mut entry) = self.observers.entry(order_id) else {
            return 0;
        };

        let mut delivered = 0;
        entry
            .get_mut()
            .retain(|observer, tx| match tx.try_send(Arc::clone(&payload)) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(%order_id, observer = *observer, "Observer lagging, delta skipped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%order_id, observer = *observer, "Pruning disconnected observer");
                    false
                }
            });

        if entry.get().is_empty() {
            entry.remove();
        }
        delivered
    }

    /// Live observers of `order_id`
    pub fn subscriber_count(&self, order_id: Uuid) -> usize {
        self.observers
            .get(&order_id)
            .map(|set| set.values().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Order ids holding at least one registered observer
    pub fn tracked_orders(&self) -> usize {
        self.observers.len()
    }

    /// Drop every observer channel and refuse new registrations
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let orders = self.observers.len();
        self.observers.clear();
        info!(orders, "Notification hub closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

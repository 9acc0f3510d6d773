//! Fan-out broadcast channel with explicit join/leave.
//!
//! Unlike `tokio::sync::broadcast`, every subscriber gets its own unbounded
//! queue, so a slow consumer never loses events. A publish is delivered to
//! the subscriber set as it stands at the moment of the publish: late joiners
//! see nothing from before they joined, and subscribers that left see nothing
//! after.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::lock;

/// Identifies one subscriber within a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

struct Shared<T> {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<SubscriberId, mpsc::UnboundedSender<T>>>,
}

/// Single-producer multi-consumer channel. Cheap to clone.
pub struct BroadcastChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BroadcastChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> Default for BroadcastChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> BroadcastChannel<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Join the channel. The subscriber leaves when the returned handle is dropped.
    pub fn join(&self) -> Subscription<T> {
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.shared.subscribers).insert(id, tx);
        Subscription {
            id,
            receiver: rx,
            channel: self.clone(),
        }
    }

    /// Join the channel with `first` already queued, ahead of any later publish.
    pub fn join_with(&self, first: T) -> Subscription<T> {
        let id = SubscriberId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(first);
        lock(&self.shared.subscribers).insert(id, tx);
        Subscription {
            id,
            receiver: rx,
            channel: self.clone(),
        }
    }

    /// Remove a subscriber. Returns whether it was still present.
    pub fn leave(&self, id: SubscriberId) -> bool {
        lock(&self.shared.subscribers).remove(&id).is_some()
    }

    /// Deliver `value` to every current subscriber. Returns the delivery count.
    pub fn publish(&self, value: T) -> usize {
        self.fan_out(value, None)
    }

    /// Deliver `value` to every current subscriber except `excluded`.
    pub fn publish_except(&self, excluded: SubscriberId, value: T) -> usize {
        self.fan_out(value, Some(excluded))
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    fn fan_out(&self, value: T, excluded: Option<SubscriberId>) -> usize {
        let mut subscribers = lock(&self.shared.subscribers);
        let mut delivered = 0;
        subscribers.retain(|id, tx| {
            if Some(*id) == excluded {
                return true;
            }
            // A closed receiver means the subscriber vanished without leaving.
            let alive = tx.send(value.clone()).is_ok();
            if alive {
                delivered += 1;
            }
            alive
        });
        delivered
    }
}

/// Receiving half of one channel membership.
pub struct Subscription<T> {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<T>,
    channel: BroadcastChannel<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next value. Returns `None` once the subscriber has left
    /// and its queue is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take an already queued value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Leave the channel, keeping values that were already queued.
    pub fn leave(&mut self) {
        lock(&self.channel.shared.subscribers).remove(&self.id);
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.leave();
    }
}

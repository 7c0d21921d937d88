//! Change notification relay.
//!
//! The bus keeps weak references to its subscribers. `publish` snapshots the
//! live subscribers under the lock and calls them after releasing it, so a
//! subscriber may freely call back into the store (or the bus) without
//! deadlocking.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::types::{ChangeReason, ItemId};

/// Structural and visibility changes broadcast to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// An item was shown or hidden through the persisting visibility path.
    VisibilityChanged {
        /// Affected item.
        id: ItemId,
        /// New visibility.
        visible: bool,
        /// Sorted snapshot of every visible id after the change.
        visible_ids: Vec<ItemId>,
    },
    /// The item or group list changed.
    ListChanged {
        /// What kind of change.
        reason: ChangeReason,
        /// Primary affected id (empty for reloads).
        id: String,
        /// Secondary id: clone source or swap partner.
        id2: Option<String>,
        /// Item count after the change.
        count: usize,
    },
    /// State was reloaded from disk.
    Reloaded {
        /// Whether the state document parsed.
        ok: bool,
        /// Item count after the reload.
        count: usize,
    },
}

/// Receives published events.
pub trait Subscriber: Send + Sync {
    /// Called once per published event, outside any bus lock.
    fn on_event(&self, event: &Event);
}

impl<F> Subscriber for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event);
    }
}

struct Slot {
    token: u64,
    subscriber: Weak<dyn Subscriber>,
}

#[derive(Default)]
struct Registry {
    next_token: u64,
    slots: Vec<Slot>,
    pending: VecDeque<Event>,
    dispatching: bool,
}

/// Thread-safe multi-subscriber relay.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Registry>>,
}

/// Keeps a subscription alive; dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    token: u64,
    registry: Weak<Mutex<Registry>>,
    _subscriber: Arc<dyn Subscriber>,
}

impl Subscription {
    /// Token identifying this subscription on its bus.
    pub const fn token(&self) -> u64 {
        self.token
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().slots.retain(|s| s.token != self.token);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. It stays registered while the returned guard lives.
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> Subscription {
        let subscriber: Arc<dyn Subscriber> = Arc::new(subscriber);
        let mut registry = self.inner.lock();
        registry.next_token += 1;
        let token = registry.next_token;
        registry.slots.push(Slot { token, subscriber: Arc::downgrade(&subscriber) });
        tracing::debug!(token, "Subscriber registered");

        Subscription {
            token,
            registry: Arc::downgrade(&self.inner),
            _subscriber: subscriber,
        }
    }

    /// Remove a subscription by token. Unknown tokens are ignored.
    pub fn unsubscribe(&self, token: u64) {
        self.inner.lock().slots.retain(|s| s.token != token);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|s| s.subscriber.strong_count() > 0)
            .count()
    }

    /// Deliver `event` to every live subscriber.
    ///
    /// A publish made from inside a subscriber is queued and delivered after
    /// the current event has reached every subscriber.
    pub fn publish(&self, event: &Event) {
        {
            let mut registry = self.inner.lock();
            registry.pending.push_back(event.clone());
            if registry.dispatching {
                return;
            }
            registry.dispatching = true;
        }

        loop {
            let (event, snapshot) = {
                let mut registry = self.inner.lock();
                let Some(event) = registry.pending.pop_front() else {
                    registry.dispatching = false;
                    return;
                };
                registry.slots.retain(|s| s.subscriber.strong_count() > 0);
                let snapshot: Vec<Arc<dyn Subscriber>> =
                    registry.slots.iter().filter_map(|s| s.subscriber.upgrade()).collect();
                (event, snapshot)
            };

            for subscriber in snapshot {
                subscriber.on_event(&event);
            }
        }
    }
}

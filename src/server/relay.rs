//! In-memory fan-out of publishes to subscribed connections.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::codec::QoS;

/// Messages a slow subscriber may have queued before new ones are dropped.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// Identifier the relay assigns to each registered connection.
pub type ConnectionId = u64;

/// A message routed to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Topic the message was published to.
    pub topic: String,
    /// Payload bytes.
    pub message: Bytes,
    /// Delivery QoS after downgrading to the subscription's grant.
    pub qos: QoS,
}

#[derive(Debug)]
struct Subscriber {
    outbox: mpsc::Sender<Delivery>,
    filters: BTreeMap<String, QoS>,
}

#[derive(Debug, Default)]
struct RelayState {
    next_id: ConnectionId,
    subscribers: HashMap<ConnectionId, Subscriber>,
}

/// Shared subscription registry.
///
/// Cloning is cheap; every clone sees the same subscribers.
#[derive(Debug, Clone)]
pub struct Relay {
    state: Arc<Mutex<RelayState>>,
    capacity: usize,
}

impl Default for Relay {
    fn default() -> Self { Self::new(DEFAULT_OUTBOX_CAPACITY) }
}

impl Relay {
    /// Create a relay whose per-connection queues hold `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection and return its id and inbox.
    #[must_use]
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.subscribers.insert(
            id,
            Subscriber {
                outbox: tx,
                filters: BTreeMap::new(),
            },
        );
        (id, rx)
    }

    /// Forget a connection and all of its subscriptions.
    pub fn unregister(&self, id: ConnectionId) { self.lock().subscribers.remove(&id); }

    /// Add or replace the subscription for `filter`.
    pub fn subscribe(&self, id: ConnectionId, filter: &str, qos: QoS) {
        if let Some(subscriber) = self.lock().subscribers.get_mut(&id) {
            subscriber.filters.insert(filter.to_owned(), qos);
        }
    }

    /// Remove the subscription for `filter`, if any.
    pub fn unsubscribe(&self, id: ConnectionId, filter: &str) {
        if let Some(subscriber) = self.lock().subscribers.get_mut(&id) {
            subscriber.filters.remove(filter);
        }
    }

    /// Number of filters registered for `id`.
    #[must_use]
    pub fn subscription_count(&self, id: ConnectionId) -> usize {
        self.lock()
            .subscribers
            .get(&id)
            .map_or(0, |subscriber| subscriber.filters.len())
    }

    /// Queue `message` for every connection subscribed to `topic`.
    ///
    /// Each subscriber receives at most one copy, at the lower of `qos` and
    /// the highest QoS granted by its matching filters. Returns the number of
    /// copies queued.
    pub fn route(&self, topic: &str, message: &Bytes, qos: QoS) -> usize {
        let state = self.lock();
        let mut delivered = 0;
        for (id, subscriber) in &state.subscribers {
            let Some(granted) = subscriber
                .filters
                .iter()
                .filter(|(filter, _)| topic_matches(filter, topic))
                .map(|(_, granted)| *granted)
                .max()
            else {
                continue;
            };
            let delivery = Delivery {
                topic: topic.to_owned(),
                message: message.clone(),
                qos: qos.min(granted),
            };
            match subscriber.outbox.try_send(delivery) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(connection = id, topic, "subscriber queue full; message dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection = id, "subscriber gone");
                }
            }
        }
        delivered
    }
}

/// Whether `filter` is a well-formed subscription filter.
///
/// A filter is non-empty, `+` occupies a whole level, and `#` occupies the
/// whole last level.
#[must_use]
pub fn valid_filter(filter: &str) -> bool {
    let mut levels = filter.split('/').peekable();
    while let Some(level) = levels.next() {
        let allowed = match level {
            "#" => levels.peek().is_none(),
            "+" => true,
            other => !other.contains(['+', '#']),
        };
        if !allowed {
            return false;
        }
    }
    !filter.is_empty()
}

/// Whether `topic` matches the subscription `filter`.
///
/// `+` matches exactly one level and `#` matches the remaining levels
/// including none. Topics beginning with `$` never match a filter that
/// begins with a wildcard, and a malformed filter matches nothing.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if !valid_filter(filter) {
        return false;
    }
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }
    let mut levels = topic.split('/');
    for pattern in filter.split('/') {
        match pattern {
            "#" => return true,
            "+" => {
                if levels.next().is_none() {
                    return false;
                }
            }
            exact => {
                if levels.next() != Some(exact) {
                    return false;
                }
            }
        }
    }
    levels.next().is_none()
}

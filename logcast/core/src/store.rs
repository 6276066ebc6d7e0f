//! Log Store - per-identity history and live subscriber registry
//!
//! The store owns two maps, both keyed by [`Identity`]:
//!
//! ```text
//!                          LogStore
//!          ┌──────────────────────────────────────────┐
//!          │ Mutex<StoreInner>                        │
//!          │   buffers:  Identity -> [line, line, ..] │
//!          │   registry: Identity -> {id -> queue}    │
//!          └───────────────────┬──────────────────────┘
//!                              │ append: try_send to every queue
//!              ┌───────────────┼───────────────┐
//!         ┌────▼────┐     ┌────▼────┐     ┌────▼────┐
//!         │ sub-1   │     │ sub-2   │     │ sub-3   │
//!         │ [1000]  │     │ [1000]  │     │ (full → │
//!         └─────────┘     └─────────┘     │ evicted)│
//!                                         └─────────┘
//! ```
//!
//! # Locking
//!
//! A single mutex covers both maps for every operation. `subscribe` replays
//! the history and registers the new queue under that lock, so no append can
//! slip between the two steps. Only `try_send` is ever called while the lock
//! is held; a queue that cannot take a line immediately is evicted instead of
//! being waited on, which keeps the producer side from ever blocking.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::BroadcastConfig;
use crate::identity::Identity;
use crate::subscription::{QueueHandle, SubscriberId, Subscription};

#[derive(Debug, Default)]
struct HistoryBuffer {
    lines: Vec<String>,
    /// Set once the size warning has been logged for this buffer
    warned: bool,
}

#[derive(Debug, Default)]
struct StoreInner {
    buffers: HashMap<Identity, HistoryBuffer>,
    registry: HashMap<Identity, HashMap<SubscriberId, QueueHandle>>,
}

/// Result of a single [`LogStore::append`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Queues that accepted the line
    pub delivered: usize,
    /// Queues removed from the registry during this append
    pub evicted: usize,
    /// IDs of the removed queues
    pub evicted_ids: Vec<SubscriberId>,
    /// History length for the identity after the append
    pub history_len: usize,
}

/// Snapshot of the store's size
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    /// Identities with a history buffer or at least one subscriber
    pub identities: usize,
    /// Lines held across all history buffers
    pub buffered_lines: usize,
    /// Registered subscriber queues across all identities
    pub subscribers: usize,
}

/// Shared in-memory log store
///
/// Cheap to clone; all clones refer to the same state.
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<Mutex<StoreInner>>,
    queue_capacity: usize,
    history_warn_lines: usize,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(&BroadcastConfig::default())
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("queue_capacity", &self.queue_capacity)
            .field("summary", &self.summary())
            .finish()
    }
}

impl LogStore {
    /// Create an empty store
    ///
    /// A zero `queue_capacity` is raised to one; callers are expected to
    /// have run [`BroadcastConfig::validate`] already.
    #[must_use]
    pub fn new(config: &BroadcastConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner::default())),
            queue_capacity: config.queue_capacity.max(1),
            history_warn_lines: config.history_warn_lines.max(1),
        }
    }

    /// Live-line capacity of every new subscriber queue
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Register a new subscriber for `identity`
    ///
    /// The returned queue is pre-loaded with the identity's current history,
    /// in order. The first live line it yields afterwards is the next line
    /// appended after this call returns.
    ///
    /// The queue holds the replay plus `queue_capacity` live lines, so the
    /// eviction budget of `queue_capacity` unread lines starts counting
    /// after the replay.
    pub fn subscribe(&self, identity: &Identity) -> Subscription {
        let id = SubscriberId::next();
        let evicted = Arc::new(AtomicBool::new(false));

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let history: &[String] = inner
            .buffers
            .get(identity)
            .map_or(&[][..], |buffer| buffer.lines.as_slice());

        // Room for the replay plus the live-line budget, so the replay below
        // can never fail while the lock is held.
        let (tx, rx) = mpsc::channel(history.len() + self.queue_capacity);
        for line in history {
            let queued = tx.try_send(line.clone()).is_ok();
            debug_assert!(queued, "replay exceeded reserved queue capacity");
        }
        let replayed = history.len();

        inner.registry.entry(identity.clone()).or_default().insert(
            id,
            QueueHandle {
                tx,
                evicted: Arc::clone(&evicted),
            },
        );
        drop(guard);

        tracing::debug!(
            identity = %identity,
            subscriber_id = %id,
            replayed,
            "Subscriber registered"
        );

        Subscription::new(id, identity.clone(), rx, evicted, replayed, self.clone())
    }

    /// Remove a subscriber from `identity`'s registry
    ///
    /// Returns `true` if the queue was registered. Removing an unknown or
    /// already-evicted queue is a no-op.
    pub fn unsubscribe(&self, identity: &Identity, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock();
        let Some(subscribers) = inner.registry.get_mut(identity) else {
            return false;
        };
        let removed = subscribers.remove(&id).is_some();
        if subscribers.is_empty() {
            inner.registry.remove(identity);
        }
        drop(inner);

        if removed {
            tracing::debug!(identity = %identity, subscriber_id = %id, "Subscriber removed");
        }
        removed
    }

    /// Fan `line` out to every registered queue, then add it to the history
    ///
    /// Never blocks. A queue that is full is evicted: it keeps the lines it
    /// already holds but receives nothing further.
    pub fn append(&self, identity: &Identity, line: impl Into<String>) -> AppendOutcome {
        let line = line.into();
        let mut outcome = AppendOutcome::default();

        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let mut registry_empty = false;
        if let Some(subscribers) = inner.registry.get_mut(identity) {
            subscribers.retain(|id, queue| match queue.tx.try_send(line.clone()) {
                Ok(()) => {
                    outcome.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    queue.mark_evicted();
                    tracing::debug!(
                        identity = %identity,
                        subscriber_id = %id,
                        "Evicting subscriber with full queue"
                    );
                    outcome.evicted += 1;
                    outcome.evicted_ids.push(*id);
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    outcome.evicted += 1;
                    outcome.evicted_ids.push(*id);
                    false
                }
            });
            registry_empty = subscribers.is_empty();
        }
        if registry_empty {
            inner.registry.remove(identity);
        }

        let buffer = inner.buffers.entry(identity.clone()).or_default();
        buffer.lines.push(line);
        outcome.history_len = buffer.lines.len();

        if !buffer.warned && buffer.lines.len() >= self.history_warn_lines {
            buffer.warned = true;
            tracing::warn!(
                identity = %identity,
                lines = buffer.lines.len(),
                "History buffer is growing without a reset"
            );
        }

        outcome
    }

    /// Discard the history for `identity`
    ///
    /// Registered queues and their contents are untouched; only what future
    /// subscribers replay changes. Returns the number of lines discarded.
    pub fn reset(&self, identity: &Identity) -> usize {
        let discarded = self
            .inner
            .lock()
            .buffers
            .remove(identity)
            .map_or(0, |buffer| buffer.lines.len());

        tracing::trace!(identity = %identity, discarded, "History reset");
        discarded
    }

    /// Copy of the current history for `identity`
    #[must_use]
    pub fn history(&self, identity: &Identity) -> Vec<String> {
        self.inner
            .lock()
            .buffers
            .get(identity)
            .map(|buffer| buffer.lines.clone())
            .unwrap_or_default()
    }

    /// Number of queues registered for `identity`
    #[must_use]
    pub fn subscriber_count(&self, identity: &Identity) -> usize {
        self.inner.lock().registry.get(identity).map_or(0, HashMap::len)
    }

    /// Whether a specific queue is still registered
    #[must_use]
    pub fn is_subscribed(&self, identity: &Identity, id: SubscriberId) -> bool {
        self.inner
            .lock()
            .registry
            .get(identity)
            .is_some_and(|subscribers| subscribers.contains_key(&id))
    }

    /// Totals across all identities
    #[must_use]
    pub fn summary(&self) -> StoreSummary {
        let inner = self.inner.lock();
        let identities = inner
            .buffers
            .keys()
            .chain(inner.registry.keys().filter(|k| !inner.buffers.contains_key(*k)))
            .count();

        StoreSummary {
            identities,
            buffered_lines: inner.buffers.values().map(|b| b.lines.len()).sum(),
            subscribers: inner.registry.values().map(HashMap::len).sum(),
        }
    }
}

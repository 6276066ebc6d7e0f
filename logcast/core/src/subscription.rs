//! Subscriber queues
//!
//! A [`Subscription`] is the reading half of one viewer's bounded queue. The
//! [`LogStore`] keeps the writing half in its registry for as long as the
//! subscriber is registered; once it is removed (by `unsubscribe` or by
//! eviction) the writing half is dropped, so the reader drains whatever is
//! still queued and then sees end-of-stream.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::identity::Identity;
use crate::store::LogStore;

/// Unique identifier for a subscriber queue
///
/// Assigned when the queue is created and stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Allocate the next unique subscriber ID
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Store-side handle of a registered queue
#[derive(Debug)]
pub(crate) struct QueueHandle {
    pub(crate) tx: mpsc::Sender<String>,
    pub(crate) evicted: Arc<AtomicBool>,
}

impl QueueHandle {
    pub(crate) fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::Release);
    }
}

/// Reading half of a subscriber queue
///
/// Yields the replayed history first, then every line appended to the
/// identity after the subscription was registered. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    identity: Identity,
    rx: mpsc::Receiver<String>,
    evicted: Arc<AtomicBool>,
    replayed: usize,
    store: LogStore,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        identity: Identity,
        rx: mpsc::Receiver<String>,
        evicted: Arc<AtomicBool>,
        replayed: usize,
        store: LogStore,
    ) -> Self {
        Self {
            id,
            identity,
            rx,
            evicted,
            replayed,
            store,
        }
    }

    /// Subscriber ID
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Number of history lines that were pre-loaded at subscribe time
    #[must_use]
    pub fn replayed(&self) -> usize {
        self.replayed
    }

    /// Whether the store dropped this queue because it fell too far behind
    ///
    /// An evicted queue still yields the lines it already holds.
    #[must_use]
    pub fn was_evicted(&self) -> bool {
        self.evicted.load(Ordering::Acquire)
    }

    /// Wait for the next line
    ///
    /// Returns `None` once the queue has been removed from the registry and
    /// everything it held has been read.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Take the next line if one is queued
    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        self.rx.try_recv()
    }

    /// Drain every line currently queued without waiting
    pub fn drain_ready(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Remove this queue from the registry now
    ///
    /// Equivalent to dropping the subscription, but lets the caller keep
    /// reading what is left in the queue.
    pub fn unsubscribe(&self) -> bool {
        self.store.unsubscribe(&self.identity, self.id)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("replayed", &self.replayed)
            .field("evicted", &self.was_evicted())
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.store.unsubscribe(&self.identity, self.id);
    }
}

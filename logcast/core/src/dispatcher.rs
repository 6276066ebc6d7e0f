//! Dispatcher - sole consumer of the inbound event stream
//!
//! Jobs publish [`LogEvent`]s through a [`LogEventSender`]. A single
//! [`Dispatcher`] task reads them in order and applies each one to the
//! [`LogStore`]:
//!
//! 1. `reset` if `reset_before`
//! 2. `append`
//! 3. `reset` if `reset_after`
//!
//! Because there is exactly one consumer, lines reach the store in the order
//! they were sent, across all identities.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::events::LogEvent;
use crate::identity::Identity;
use crate::store::LogStore;

/// Default capacity of the inbound event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Why [`Dispatcher::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEnd {
    /// Every sender was dropped and the channel was drained
    StreamClosed,
    /// The cancellation token fired
    Cancelled,
}

/// Producer-side handle for publishing log events
///
/// Cloneable; the dispatcher stops once every clone has been dropped.
#[derive(Clone, Debug)]
pub struct LogEventSender {
    tx: mpsc::Sender<LogEvent>,
}

/// The event stream was closed because the dispatcher is gone
#[derive(Debug, Clone, thiserror::Error)]
#[error("dispatcher is no longer running")]
pub struct DispatcherClosed(pub LogEvent);

impl LogEventSender {
    /// Publish an event, waiting for channel capacity
    pub async fn send(&self, event: LogEvent) -> Result<(), DispatcherClosed> {
        self.tx.send(event).await.map_err(|e| DispatcherClosed(e.0))
    }

    /// Publish a plain output line
    pub async fn send_line(
        &self,
        identity: Identity,
        line: impl Into<String>,
    ) -> Result<(), DispatcherClosed> {
        self.send(LogEvent::line(identity, line)).await
    }

    /// Whether the dispatcher has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a connected sender/dispatcher pair
#[must_use]
pub fn channel(store: LogStore, capacity: usize) -> (LogEventSender, Dispatcher) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (LogEventSender { tx }, Dispatcher::new(store, rx))
}

/// Applies inbound events to the store, one at a time
pub struct Dispatcher {
    store: LogStore,
    rx: mpsc::Receiver<LogEvent>,
    processed: u64,
}

impl Dispatcher {
    /// Create a dispatcher over an existing receiver
    #[must_use]
    pub fn new(store: LogStore, rx: mpsc::Receiver<LogEvent>) -> Self {
        Self {
            store,
            rx,
            processed: 0,
        }
    }

    /// Number of events applied so far
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Apply a single event to the store
    pub fn dispatch(&mut self, event: LogEvent) {
        let LogEvent {
            identity,
            line,
            reset_before,
            reset_after,
        } = event;

        if reset_before {
            self.store.reset(&identity);
        }

        let outcome = self.store.append(&identity, line);
        if outcome.evicted > 0 {
            tracing::debug!(
                identity = %identity,
                evicted = outcome.evicted,
                delivered = outcome.delivered,
                "Slow subscribers evicted"
            );
        }

        if reset_after {
            self.store.reset(&identity);
        }

        self.processed += 1;
    }

    /// Consume events until the stream closes or `cancel` fires
    ///
    /// Events already taken from the channel are always applied in full
    /// before cancellation is observed.
    pub async fn run(mut self, cancel: CancellationToken) -> DispatchEnd {
        tracing::info!("Dispatcher started");

        let end = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break DispatchEnd::Cancelled,
                event = self.rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break DispatchEnd::StreamClosed,
                },
            }
        };

        tracing::info!(processed = self.processed, reason = ?end, "Dispatcher stopped");
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new("acme", "infra", 42, "prod")
    }

    #[test]
    fn test_reset_before_replaces_history() {
        let store = LogStore::default();
        let (_tx, mut dispatcher) = channel(store.clone(), 8);
        let id = identity();

        dispatcher.dispatch(LogEvent::line(id.clone(), "x"));
        dispatcher.dispatch(LogEvent::line(id.clone(), "y"));
        dispatcher.dispatch(LogEvent::line(id.clone(), "stale").with_reset_before());

        assert_eq!(store.history(&id), vec!["stale"]);
        let mut sub = store.subscribe(&id);
        assert_eq!(sub.drain_ready(), vec!["stale"]);
    }

    #[test]
    fn test_reset_after_still_delivers_line() {
        let store = LogStore::default();
        let (_tx, mut dispatcher) = channel(store.clone(), 8);
        let id = identity();
        let mut sub = store.subscribe(&id);

        dispatcher.dispatch(LogEvent::line(id.clone(), "done").with_reset_after());

        assert!(store.history(&id).is_empty());
        assert_eq!(sub.drain_ready(), vec!["done"]);
        assert_eq!(dispatcher.processed(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_when_senders_dropped() {
        let store = LogStore::default();
        let (tx, dispatcher) = channel(store.clone(), 8);
        let id = identity();

        tx.send_line(id.clone(), "a").await.unwrap();
        tx.send_line(id.clone(), "b").await.unwrap();
        drop(tx);

        let end = dispatcher.run(CancellationToken::new()).await;
        assert_eq!(end, DispatchEnd::StreamClosed);
        assert_eq!(store.history(&id), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = LogStore::default();
        let (tx, dispatcher) = channel(store, 8);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(dispatcher.run(cancel.clone()));
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), DispatchEnd::Cancelled);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_send_after_dispatcher_gone_fails() {
        let (tx, dispatcher) = channel(LogStore::default(), 8);
        drop(dispatcher);

        let err = tx.send_line(identity(), "lost").await.unwrap_err();
        assert_eq!(err.0.line, "lost");
    }
}

//! Broadcast engine integration tests
//!
//! These tests drive the store, dispatcher and sessions together and check
//! the ordering and backpressure guarantees viewers rely on:
//! - replay of the current history on subscribe
//! - gap-free, duplicate-free handoff from replay to live lines
//! - eviction of full queues without blocking the producer
//! - reset semantics and idempotent unsubscribe
//! - identical fan-out to concurrent subscribers

use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::task::JoinSet;

use logcast_core::{
    channel, BroadcastConfig, CancellationToken, DispatchEnd, Identity, LogEvent, LogStore,
    SubscriberSession,
};

fn prod() -> Identity {
    Identity::new("acme", "infra", 42, "prod")
}

// =============================================================================
// Example scenarios
// =============================================================================

#[test]
fn test_late_subscriber_sees_history_first() {
    let store = LogStore::default();
    let id = prod();

    store.append(&id, "plan started");
    let mut sub = store.subscribe(&id);

    assert_eq!(sub.try_recv().unwrap(), "plan started");
}

#[test]
fn test_subscriber_on_empty_history_gets_live_lines_in_order() {
    let store = LogStore::default();
    let id = prod();

    let mut sub = store.subscribe(&id);
    store.append(&id, "a");
    store.append(&id, "b");

    assert_eq!(sub.drain_ready(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_reset_before_discards_previous_run() {
    let store = LogStore::default();
    let (tx, dispatcher) = channel(store.clone(), 16);
    let id = prod();

    tx.send_line(id.clone(), "x").await.unwrap();
    tx.send_line(id.clone(), "y").await.unwrap();
    tx.send(LogEvent::line(id.clone(), "stale").with_reset_before())
        .await
        .unwrap();
    drop(tx);
    assert_eq!(
        dispatcher.run(CancellationToken::new()).await,
        DispatchEnd::StreamClosed
    );

    let mut sub = store.subscribe(&id);
    assert_eq!(sub.replayed(), 1);
    assert_eq!(sub.drain_ready(), vec!["stale"]);
}

#[test]
fn test_overflow_evicts_after_capacity() {
    let store = LogStore::default();
    let id = prod();
    let capacity = store.queue_capacity();
    assert_eq!(capacity, 1000);

    let mut sub = store.subscribe(&id);
    for i in 0..=capacity {
        store.append(&id, format!("line {i}"));
    }

    assert!(sub.was_evicted());
    assert!(!store.is_subscribed(&id, sub.id()));

    store.append(&id, "after eviction");

    let received = sub.drain_ready();
    assert_eq!(received.len(), capacity);
    assert_eq!(received.first().map(String::as_str), Some("line 0"));
    assert_eq!(received.last().map(String::as_str), Some("line 999"));
    assert!(!received.iter().any(|l| l == "after eviction"));
    assert_eq!(store.history(&id).len(), capacity + 2);
}

#[test]
fn test_two_subscribers_receive_identical_sequences() {
    let store = LogStore::default();
    let id = prod();
    store.append(&id, "before");

    let mut first = store.subscribe(&id);
    let mut second = store.subscribe(&id);
    for line in ["one", "two", "three"] {
        store.append(&id, line);
    }

    let a = first.drain_ready();
    let b = second.drain_ready();
    assert_eq!(a, vec!["before", "one", "two", "three"]);
    assert_eq!(a, b);
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn test_reset_does_not_touch_open_queues() {
    let store = LogStore::default();
    let id = prod();
    store.append(&id, "old");
    let mut before = store.subscribe(&id);

    store.reset(&id);
    store.append(&id, "new");

    assert_eq!(before.drain_ready(), vec!["old", "new"]);
    let mut after = store.subscribe(&id);
    assert_eq!(after.drain_ready(), vec!["new"]);
}

#[test]
fn test_unsubscribe_after_eviction_is_noop() {
    let store = LogStore::new(&BroadcastConfig {
        queue_capacity: 1,
        ..Default::default()
    });
    let id = prod();
    let sub = store.subscribe(&id);

    store.append(&id, "1");
    store.append(&id, "2");
    assert!(sub.was_evicted());

    assert!(!store.unsubscribe(&id, sub.id()));
    assert!(!sub.unsubscribe());
    assert_eq!(store.subscriber_count(&id), 0);
}

#[test]
fn test_slow_subscriber_does_not_affect_fast_one() {
    let store = LogStore::new(&BroadcastConfig {
        queue_capacity: 4,
        ..Default::default()
    });
    let id = prod();
    let mut fast = store.subscribe(&id);
    let slow = store.subscribe(&id);

    let mut seen = Vec::new();
    for i in 0..20 {
        store.append(&id, i.to_string());
        seen.extend(fast.drain_ready());
    }

    assert!(slow.was_evicted());
    assert!(!fast.was_evicted());
    assert_eq!(seen, (0..20).map(|i| i.to_string()).collect::<Vec<_>>());
}

/// Subscribers joining at arbitrary points while a producer is appending must
/// each see the full sequence exactly once: replayed prefix, then live tail.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribe_is_gap_free() {
    const LINES: usize = 2_000;

    let store = LogStore::new(&BroadcastConfig {
        queue_capacity: LINES,
        ..Default::default()
    });
    let id = prod();
    let expected: Vec<String> = (0..LINES).map(|i| i.to_string()).collect();

    let producer = {
        let (store, id) = (store.clone(), id.clone());
        tokio::spawn(async move {
            for i in 0..LINES {
                store.append(&id, i.to_string());
                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };

    let mut readers = JoinSet::new();
    for delay in 0..8u64 {
        let (store, id) = (store.clone(), id.clone());
        readers.spawn(async move {
            tokio::time::sleep(Duration::from_micros(delay * 50)).await;
            let mut sub = store.subscribe(&id);
            let mut lines = Vec::with_capacity(LINES);
            while lines.len() < LINES {
                match sub.recv().await {
                    Some(line) => lines.push(line),
                    None => break,
                }
            }
            lines
        });
    }

    producer.await.unwrap();
    while let Some(result) = readers.join_next().await {
        assert_eq!(result.unwrap(), expected);
    }
}

/// Different identities sharing the store never see each other's lines.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identities_are_isolated_under_load() {
    let store = LogStore::default();
    let ids: Vec<Identity> = (0..4)
        .map(|n| Identity::new("acme", "infra", n, "prod"))
        .collect();

    let mut subs: Vec<_> = ids.iter().map(|id| store.subscribe(id)).collect();

    let mut producers = JoinSet::new();
    for id in ids.clone() {
        let store = store.clone();
        producers.spawn(async move {
            for i in 0..100 {
                store.append(&id, format!("{id}:{i}"));
            }
        });
    }
    while producers.join_next().await.is_some() {}

    for (sub, id) in subs.iter_mut().zip(&ids) {
        let lines = sub.drain_ready();
        assert_eq!(lines.len(), 100);
        assert!(lines.iter().all(|l| l.starts_with(&id.to_string())));
    }
}

// =============================================================================
// Sessions end to end
// =============================================================================

#[tokio::test]
async fn test_dispatcher_and_session_end_to_end() {
    let config = BroadcastConfig {
        throttle_ms: 0,
        ..Default::default()
    };
    let store = LogStore::new(&config);
    let (tx, dispatcher) = channel(store.clone(), 16);
    let cancel = CancellationToken::new();
    let dispatcher_task = tokio::spawn(dispatcher.run(cancel.child_token()));

    let id = prod();
    tx.send(LogEvent::line(id.clone(), "Initializing...").with_reset_before())
        .await
        .unwrap();

    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::channel::<Vec<u8>>(16);
    struct ChannelSink(tokio::sync::mpsc::Sender<Vec<u8>>);

    #[async_trait::async_trait]
    impl logcast_core::LineSink for ChannelSink {
        async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), logcast_core::SessionError> {
            self.0
                .send(frame)
                .await
                .map_err(|_| logcast_core::SessionError::Closed)
        }
    }

    // Wait for the first line to land so the session replays it.
    while store.history(&id).is_empty() {
        tokio::task::yield_now().await;
    }

    let session = SubscriberSession::new(store.clone(), &config);
    let session_cancel = cancel.child_token();
    let session_task = {
        let id = id.clone();
        tokio::spawn(async move {
            let mut sink = ChannelSink(frame_tx);
            session.run(&id, &mut sink, &session_cancel).await
        })
    };

    assert_eq!(frame_rx.recv().await.unwrap(), b"Initializing...\r\n");

    tx.send(LogEvent::line(id.clone(), "Apply complete!").with_reset_after())
        .await
        .unwrap();
    assert_eq!(frame_rx.recv().await.unwrap(), b"Apply complete!\r\n");

    cancel.cancel();
    session_task.await.unwrap();
    assert_eq!(dispatcher_task.await.unwrap(), DispatchEnd::Cancelled);
    assert!(store.history(&id).is_empty());
    assert_eq!(store.subscriber_count(&id), 0);
}

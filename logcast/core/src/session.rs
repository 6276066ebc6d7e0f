//! Subscriber Session - drains one subscription into one connection
//!
//! A session subscribes to an identity, then forwards every queued line to
//! its [`LineSink`] as a separate message terminated by `\r\n`, pausing for
//! the throttle interval after each one. It ends when:
//!
//! - the cancellation token fires (server shutdown, client went away)
//! - the queue is closed (evicted for falling behind, or unsubscribed) and
//!   fully drained
//! - the sink reports a send failure
//!
//! There is no retry; a viewer that reconnects gets a fresh subscription and
//! a fresh replay.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::BroadcastConfig;
use crate::identity::Identity;
use crate::store::LogStore;
use crate::subscription::Subscription;

/// Delimiter appended to every line sent to a viewer
pub const LINE_DELIMITER: &str = "\r\n";

/// Errors raised by a [`LineSink`]
#[derive(Debug, Error)]
pub enum SessionError {
    /// The peer closed the connection
    #[error("connection closed by peer")]
    Closed,

    /// The transport failed to deliver the message
    #[error("failed to send line: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SessionError {
    /// Wrap any transport error
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// Destination for framed lines (a WebSocket, a test buffer, ...)
#[async_trait]
pub trait LineSink: Send {
    /// Deliver one framed line as a single message
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), SessionError>;
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The cancellation token fired
    Cancelled,
    /// The queue was removed from the registry and everything in it was sent
    QueueClosed {
        /// `true` if the store evicted the queue for falling behind
        evicted: bool,
    },
    /// The sink failed; the session is over
    SendFailed(SessionError),
}

/// Frame a line for transmission
#[must_use]
pub fn frame_line(line: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(line.len() + LINE_DELIMITER.len());
    frame.extend_from_slice(line.as_bytes());
    frame.extend_from_slice(LINE_DELIMITER.as_bytes());
    frame
}

/// Runs the subscribe / drain / throttle loop for viewers
#[derive(Clone, Debug)]
pub struct SubscriberSession {
    store: LogStore,
    throttle: Duration,
}

impl SubscriberSession {
    /// Create a session runner over `store`
    #[must_use]
    pub fn new(store: LogStore, config: &BroadcastConfig) -> Self {
        Self {
            store,
            throttle: config.throttle(),
        }
    }

    /// Subscribe to `identity` and stream into `sink` until the session ends
    ///
    /// The subscription is removed from the store on every exit path,
    /// including when the future is dropped mid-way.
    pub async fn run<S: LineSink + ?Sized>(
        &self,
        identity: &Identity,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        let mut subscription = self.store.subscribe(identity);
        let subscriber_id = subscription.id();

        tracing::info!(
            identity = %identity,
            subscriber_id = %subscriber_id,
            replayed = subscription.replayed(),
            "Viewer session started"
        );

        let end = self.pump(&mut subscription, sink, cancel).await;
        subscription.unsubscribe();

        match &end {
            SessionEnd::SendFailed(e) => {
                tracing::warn!(identity = %identity, subscriber_id = %subscriber_id, error = %e, "Viewer session failed");
            }
            SessionEnd::QueueClosed { evicted: true } => {
                tracing::info!(identity = %identity, subscriber_id = %subscriber_id, "Viewer session ended after eviction");
            }
            other => {
                tracing::info!(identity = %identity, subscriber_id = %subscriber_id, end = ?other, "Viewer session ended");
            }
        }
        end
    }

    async fn pump<S: LineSink + ?Sized>(
        &self,
        subscription: &mut Subscription,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> SessionEnd {
        loop {
            let next = tokio::select! {
                biased;

                () = cancel.cancelled() => return SessionEnd::Cancelled,
                line = subscription.recv() => line,
            };

            let Some(line) = next else {
                return SessionEnd::QueueClosed {
                    evicted: subscription.was_evicted(),
                };
            };

            tokio::select! {
                biased;

                () = cancel.cancelled() => return SessionEnd::Cancelled,
                sent = sink.send_frame(frame_line(&line)) => {
                    if let Err(e) = sent {
                        return SessionEnd::SendFailed(e);
                    }
                }
            }

            if !self.throttle.is_zero() {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => return SessionEnd::Cancelled,
                    () = tokio::time::sleep(self.throttle) => {}
                }
            }
        }
    }
}

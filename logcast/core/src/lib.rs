//! Logcast Core - live log broadcast engine
//!
//! Fans job output out to any number of live viewers, grouped by
//! [`Identity`] (organization, repository, review-request number, project).
//! A viewer that connects mid-run first receives everything produced so far,
//! then every later line, with no gap and no duplicate at the boundary.
//!
//! # Architecture
//!
//! ```text
//!   running jobs
//!        │  LogEvent { identity, line, reset_before, reset_after }
//!        ▼
//!  ┌─────────────┐      ┌──────────────────────────────────────────┐
//!  │ Dispatcher  │─────▶│ LogStore                                 │
//!  │ (1 task)    │      │   history:  Identity -> [lines]          │
//!  └─────────────┘      │   registry: Identity -> {bounded queue}  │
//!                       └───────┬──────────────┬───────────────────┘
//!                               │ try_send     │ try_send
//!                       ┌───────▼──────┐ ┌─────▼────────┐
//!                       │ Subscriber   │ │ Subscriber   │   one per
//!                       │ Session      │ │ Session      │   viewer
//!                       └───────┬──────┘ └─────┬────────┘
//!                               ▼              ▼
//!                           WebSocket      WebSocket
//! ```
//!
//! # Key Types
//!
//! - [`LogStore`]: history buffers and subscriber registry behind one lock
//! - [`Subscription`]: reading half of one viewer's bounded queue
//! - [`Dispatcher`] / [`LogEventSender`]: the ordered inbound event stream
//! - [`SubscriberSession`]: throttled drain of a subscription into a [`LineSink`]
//! - [`ProjectStatusStore`]: existence check used to gate the viewer page
//!
//! # Backpressure
//!
//! The producer never waits on a viewer. A viewer whose queue is full when a
//! line arrives is evicted: it keeps what it already has, receives nothing
//! more, and its session ends once the queue is drained.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dispatcher;
pub mod events;
pub mod identity;
pub mod session;
pub mod status;
pub mod store;
pub mod subscription;

pub use config::{BroadcastConfig, ConfigError};
pub use dispatcher::{channel, DispatchEnd, Dispatcher, DispatcherClosed, LogEventSender};
pub use events::LogEvent;
pub use identity::{Identity, IdentityError};
pub use session::{frame_line, LineSink, SessionEnd, SessionError, SubscriberSession};
pub use status::{InMemoryProjectStatus, ProjectStatusStore, StatusError};
pub use store::{AppendOutcome, LogStore, StoreSummary};
pub use subscription::{SubscriberId, Subscription};

// Re-exported so callers can cancel sessions without a direct dependency.
pub use tokio_util::sync::CancellationToken;

//! Daemon Server Implementation
//!
//! Wires the broadcast engine to its two edges and runs them until shutdown:
//! - the ingest socket, where jobs push log events
//! - the HTTP server, where viewers load the page and open the WebSocket
//!
//! ```text
//!                       DaemonServer
//!                            │
//!        ┌───────────────────┼────────────────────┐
//!        │                   │                    │
//!  IngestListener        Dispatcher          axum Router
//!  (unix socket)         (1 task)            (TCP, per-viewer sessions)
//!        │                   │                    │
//!        └──── LogEvent ────▶└──── LogStore ◀─────┘
//! ```
//!
//! Every task holds a child of the root cancellation token, so one signal
//! tears everything down.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use logcast_core::{channel, CancellationToken, DispatchEnd, InMemoryProjectStatus, LogStore};

use crate::config::DaemonConfig;
use crate::ingest::IngestListener;
use crate::routes::{router, AppState};

/// The main daemon server
pub struct DaemonServer {
    config: DaemonConfig,
}

impl DaemonServer {
    /// Create a server for a validated configuration
    pub fn new(config: DaemonConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` is cancelled or a listener fails
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let config = self.config;

        let store = LogStore::new(&config.broadcast);
        let status = InMemoryProjectStatus::new();
        let (events, dispatcher) = channel(store.clone(), config.event_capacity);

        let http = TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind HTTP listener on {}", config.listen_addr))?;
        let ingest = IngestListener::bind(&config.ingest_socket, events, status.clone())?;

        info!(
            addr = %config.listen_addr,
            base_path = %config.base_path,
            queue_capacity = config.broadcast.queue_capacity,
            throttle_ms = config.broadcast.throttle_ms,
            "Listening for viewers"
        );

        let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.child_token()));
        let ingest_task = tokio::spawn(ingest.run(shutdown.child_token()));

        let state = AppState::new(
            store.clone(),
            Arc::new(status),
            &config.broadcast,
            &config.base_path,
            shutdown.clone(),
        );
        let graceful = shutdown.clone();
        let served = axum::serve(http, router(state))
            .with_graceful_shutdown(async move { graceful.cancelled().await })
            .await
            .context("HTTP server failed");

        // The HTTP server only returns early on error; make sure the rest stops too.
        shutdown.cancel();

        match ingest_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Ingest listener stopped with error"),
            Err(e) => error!(error = %e, "Ingest listener task panicked"),
        }

        match dispatcher_task.await {
            Ok(end @ (DispatchEnd::Cancelled | DispatchEnd::StreamClosed)) => {
                info!(end = ?end, summary = ?store.summary(), "Dispatcher stopped");
            }
            Err(e) => error!(error = %e, "Dispatcher task panicked"),
        }

        served
    }
}

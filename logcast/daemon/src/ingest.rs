//! Ingest listener
//!
//! Running jobs connect to a Unix socket and write one JSON [`LogEvent`] per
//! line. Each valid event registers its project with the status store (so
//! the viewer page starts resolving) and is forwarded to the dispatcher.
//!
//! ```text
//!   job ──┐
//!   job ──┼──▶ ingest.sock ──▶ IngestListener ──▶ LogEventSender ──▶ Dispatcher
//!   job ──┘                        │
//!                                  └──▶ InMemoryProjectStatus::register
//! ```
//!
//! The socket is created owner-only (0600) and peers running as a different
//! user are rejected.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn, Instrument};

use logcast_core::{CancellationToken, InMemoryProjectStatus, LogEvent, LogEventSender};

/// Default cap on simultaneous producer connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Identifier for one producer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ingest-{}", self.0)
    }
}

/// Per-connection bookkeeping
struct ConnectionState {
    connected_at: Instant,
    peer_uid: Option<u32>,
    cancel: CancellationToken,
}

/// Accepts producer connections on the ingest socket
pub struct IngestListener {
    socket_path: PathBuf,
    listener: UnixListener,
    events: LogEventSender,
    status: InMemoryProjectStatus,
    max_connections: usize,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
}

impl IngestListener {
    /// Create the socket and start listening
    ///
    /// Creates the parent directory if needed and replaces a stale socket
    /// left by a previous run.
    pub fn bind(
        socket_path: &Path,
        events: LogEventSender,
        status: InMemoryProjectStatus,
    ) -> Result<Self> {
        prepare_socket(socket_path)?;

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind to {}", socket_path.display()))?;

        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict {}", socket_path.display()))?;
        }

        info!(path = %socket_path.display(), "Listening for log events");

        Ok(Self {
            socket_path: socket_path.to_path_buf(),
            listener,
            events,
            status,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connection_states: Arc::new(DashMap::new()),
        })
    }

    /// Accept connections until `cancel` fires, then clean up
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        loop {
            let stream = tokio::select! {
                () = cancel.cancelled() => {
                    info!("Shutdown requested, stopping ingest accept loop");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => stream,
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        continue;
                    }
                },
            };

            self.admit(stream, &cancel);
        }

        self.shutdown()
    }

    fn admit(&self, stream: UnixStream, cancel: &CancellationToken) {
        if self.connection_states.len() >= self.max_connections {
            warn!(
                max_connections = self.max_connections,
                "Connection limit reached, rejecting producer"
            );
            return;
        }

        let peer_uid = stream.peer_cred().ok().map(|cred| cred.uid());
        let our_uid = unsafe { libc::getuid() };
        if let Some(uid) = peer_uid {
            if uid != our_uid && uid != 0 {
                warn!(
                    peer_uid = uid,
                    our_uid = our_uid,
                    "Rejecting producer from different user"
                );
                return;
            }
        }

        let conn_id = ConnectionId::next();
        let conn_cancel = cancel.child_token();
        self.connection_states.insert(
            conn_id,
            ConnectionState {
                connected_at: Instant::now(),
                peer_uid,
                cancel: conn_cancel.clone(),
            },
        );

        info!(
            conn_id = %conn_id,
            peer_uid = ?peer_uid,
            active_connections = self.connection_states.len(),
            "Producer connected"
        );

        tokio::spawn(
            handle_connection(
                conn_id,
                stream,
                self.events.clone(),
                self.status.clone(),
                Arc::clone(&self.connection_states),
                conn_cancel,
            )
            .instrument(tracing::info_span!("ingest", %conn_id)),
        );
    }

    fn shutdown(&self) -> Result<()> {
        let conn_ids: Vec<ConnectionId> = self.connection_states.iter().map(|r| *r.key()).collect();
        for conn_id in conn_ids {
            if let Some((_, state)) = self.connection_states.remove(&conn_id) {
                debug!(conn_id = %conn_id, peer_uid = ?state.peer_uid, "Closing producer connection");
                state.cancel.cancel();
            }
        }

        if self.socket_path.exists() {
            fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove socket: {}", self.socket_path.display())
            })?;
            info!(path = %self.socket_path.display(), "Ingest socket removed");
        }
        Ok(())
    }
}

fn prepare_socket(socket_path: &Path) -> Result<()> {
    if let Some(parent) = socket_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {}", parent.display()))?;
            info!(path = %parent.display(), "Created socket directory");
        }
    }

    if socket_path.exists() {
        warn!(path = %socket_path.display(), "Removing stale socket file");
        fs::remove_file(socket_path)
            .with_context(|| format!("Failed to remove stale socket: {}", socket_path.display()))?;
    }

    Ok(())
}

/// Parse one wire line into an event
///
/// Blank lines yield `Ok(None)`.
fn parse_event(raw: &str) -> Result<Option<LogEvent>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    serde_json::from_str(raw).map(Some).map_err(|e| e.to_string())
}

async fn handle_connection(
    conn_id: ConnectionId,
    stream: UnixStream,
    events: LogEventSender,
    status: InMemoryProjectStatus,
    connection_states: Arc<DashMap<ConnectionId, ConnectionState>>,
    cancel: CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut forwarded: u64 = 0;

    loop {
        buf.clear();
        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!("Producer disconnected (EOF)");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Read error");
                break;
            }
        }

        let raw = match std::str::from_utf8(&buf) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Skipping log event that is not UTF-8");
                continue;
            }
        };

        match parse_event(raw) {
            Ok(Some(event)) => {
                status.register(&event.identity);
                if events.send(event).await.is_err() {
                    warn!("Dispatcher stopped, closing producer connection");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Skipping malformed log event"),
        }
    }

    let uptime_secs = connection_states
        .remove(&conn_id)
        .map(|(_, state)| state.connected_at.elapsed().as_secs());
    info!(
        forwarded,
        uptime_secs = ?uptime_secs,
        active_connections = connection_states.len(),
        "Producer connection finished"
    );
}

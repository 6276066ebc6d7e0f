//! HTTP and WebSocket routes
//!
//! ```text
//! GET {base}/jobs/{org}/{repo}/{pull}/{project}      viewer page
//! GET {base}/jobs/{org}/{repo}/{pull}/{project}/ws   live line stream
//! GET {base}/healthz                                 store summary
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn, Instrument};

use logcast_core::{
    BroadcastConfig, CancellationToken, Identity, IdentityError, LineSink, LogStore,
    ProjectStatusStore, SessionEnd, SessionError, StatusError, StoreSummary, SubscriberSession,
};

use crate::templates::{render_log_page, render_not_found, LogPage};

/// Version reported on the viewer page and by the health route
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    store: LogStore,
    sessions: SubscriberSession,
    status: Arc<dyn ProjectStatusStore>,
    base_path: Arc<str>,
    shutdown: CancellationToken,
}

impl AppState {
    /// Build handler state over an existing store
    ///
    /// Viewer sessions get child tokens of `shutdown`.
    pub fn new(
        store: LogStore,
        status: Arc<dyn ProjectStatusStore>,
        broadcast: &BroadcastConfig,
        base_path: &str,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: SubscriberSession::new(store.clone(), broadcast),
            store,
            status,
            base_path: Arc::from(base_path),
            shutdown,
        }
    }
}

/// Route-level failures and their HTTP mapping
#[derive(Debug, Error)]
pub enum ApiError {
    /// Route parameters do not form a valid identity
    #[error("invalid job identity: {0}")]
    Identity(#[from] IdentityError),

    /// The existence check itself failed
    #[error(transparent)]
    Status(#[from] StatusError),

    /// The project has never reported output
    #[error("unknown project {0}")]
    NotFound(Identity),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(identity) => {
                debug!(identity = %identity, "Viewer page requested for unknown project");
                (StatusCode::NOT_FOUND, Html(render_not_found(&identity))).into_response()
            }
            other => {
                error!(error = %other, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
            }
        }
    }
}

type IdentityParams = Path<(String, String, String, String)>;

fn identity_from(Path((org, repo, pull, project)): IdentityParams) -> Result<Identity, ApiError> {
    Ok(Identity::from_parts(&org, &repo, &pull, &project)?)
}

/// Build the router, nested under the configured base path
pub fn router(state: AppState) -> Router {
    let base_path = Arc::clone(&state.base_path);
    let routes = Router::new()
        .route("/jobs/{org}/{repo}/{pull}/{project}", get(log_page))
        .route("/jobs/{org}/{repo}/{pull}/{project}/ws", get(log_stream))
        .route("/healthz", get(healthz))
        .with_state(state);

    if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(&base_path, routes)
    }
}

async fn log_page(
    State(state): State<AppState>,
    params: IdentityParams,
) -> Result<Html<String>, ApiError> {
    let identity = identity_from(params)?;

    if !state.status.project_exists(&identity).await? {
        return Err(ApiError::NotFound(identity));
    }

    Ok(Html(render_log_page(&LogPage {
        identity: &identity,
        base_path: &state.base_path,
        version: VERSION,
    })))
}

async fn log_stream(
    State(state): State<AppState>,
    params: IdentityParams,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let identity = identity_from(params)?;
    let span = tracing::info_span!("session", identity = %identity);

    Ok(upgrade
        .on_failed_upgrade(|e| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| serve_viewer(state, identity, socket).instrument(span)))
}

/// Writing half of a viewer's WebSocket
struct WebSocketSink(SplitSink<WebSocket, Message>);

#[async_trait]
impl LineSink for WebSocketSink {
    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), SessionError> {
        self.0
            .send(Message::Binary(frame.into()))
            .await
            .map_err(SessionError::transport)
    }
}

async fn serve_viewer(state: AppState, identity: Identity, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();
    let cancel = state.shutdown.child_token();

    // Viewers never send anything meaningful; reading only detects a hang-up
    // while the session is parked on an idle queue.
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            while let Some(Ok(message)) = receiver.next().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
            }
            cancel.cancel();
        }
    });

    let mut sink = WebSocketSink(sender);
    let end = state.sessions.run(&identity, &mut sink, &cancel).await;
    watcher.abort();

    if !matches!(end, SessionEnd::SendFailed(_)) {
        if let Err(e) = sink.0.close().await {
            debug!(error = %e, "WebSocket already closed");
        }
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
    store: StoreSummary,
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: VERSION,
        store: state.store.summary(),
    })
}

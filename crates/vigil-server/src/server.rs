//! `VigilServer` — Axum HTTP + WebSocket server.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use vigil_core::{SessionError, SessionId, SharedStatus};
use vigil_runtime::Gateway;

use crate::bridge::spawn_event_bridge;
use crate::broadcast::BroadcastManager;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::ws;

/// How long `serve` waits for the event bridge after the acceptor stops.
const BRIDGE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The running gateway.
    pub gateway: Arc<Gateway>,
    /// Broadcast manager for event fan-out.
    pub broadcast: Arc<BroadcastManager>,
    /// The gateway's status snapshot.
    pub status: SharedStatus,
    /// Cancelled when the server shuts down; open sockets watch it.
    pub cancel: CancellationToken,
    /// When the server started.
    pub start_time: Instant,
    /// Per-client outbound channel capacity.
    pub client_buffer: usize,
}

/// The gateway's local HTTP + WebSocket surface.
pub struct VigilServer {
    config: ServerConfig,
    gateway: Arc<Gateway>,
    broadcast: Arc<BroadcastManager>,
    cancel: CancellationToken,
    start_time: Instant,
}

impl VigilServer {
    /// Create a server in front of a running gateway.
    #[must_use]
    pub fn new(config: ServerConfig, gateway: Arc<Gateway>) -> Self {
        Self {
            config,
            gateway,
            broadcast: Arc::new(BroadcastManager::new()),
            cancel: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            gateway: self.gateway.clone(),
            broadcast: self.broadcast.clone(),
            status: self.gateway.shared_status(),
            cancel: self.cancel.clone(),
            start_time: self.start_time,
            client_buffer: self.config.client_buffer,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(ws::ws_handler))
            .route("/session/start", post(start_session_handler))
            .route("/session/stop", post(stop_session_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        TcpListener::bind((self.config.host.as_str(), self.config.port)).await
    }

    /// Serve until shutdown is signalled.
    ///
    /// Teardown is two-phase: the acceptor and the open sockets stop
    /// first, then the event bridge gets a bounded window to finish
    /// fanning out whatever it already pulled from the gateway.
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "server listening");
        let bridge = spawn_event_bridge(
            self.gateway.subscribe(),
            self.broadcast.clone(),
            self.cancel.child_token(),
        );

        let cancel = self.cancel.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        match tokio::time::timeout(BRIDGE_DRAIN_TIMEOUT, bridge).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "event bridge aborted"),
            Err(_) => warn!("event bridge did not stop in time"),
        }
        Ok(())
    }

    /// Signal shutdown: the acceptor stops, every open socket gets a
    /// Close frame, and the event bridge winds down.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether shutdown has been signalled.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Get the broadcast manager.
    #[must_use]
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartSessionRequest {
    secret: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: SessionId,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn session_error_response(err: &SessionError) -> (StatusCode, Json<ErrorBody>) {
    let status = match err {
        SessionError::AlreadyActive | SessionError::NotActive => StatusCode::CONFLICT,
        SessionError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.broadcast.connection_count().await;
    let snapshot = state.status.snapshot();
    Json(health::health_check(state.start_time, connections, &snapshot))
}

/// POST /session/start
async fn start_session_handler(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<SessionResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.gateway.start_session(req.secret).await {
        Ok(session_id) => Ok(Json(SessionResponse { session_id })),
        Err(e) => Err(session_error_response(&e)),
    }
}

/// POST /session/stop
async fn stop_session_handler(
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, (StatusCode, Json<ErrorBody>)> {
    match state.gateway.end_session().await {
        Ok(session_id) => Ok(Json(SessionResponse { session_id })),
        Err(e) => Err(session_error_response(&e)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

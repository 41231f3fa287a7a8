//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

use vigil_core::{ConnectionState, StatusSnapshot};

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the gateway started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Whether a monitoring session is active.
    pub session_active: bool,
    /// Current serial link state.
    pub connection_state: ConnectionState,
}

/// Build a health response from live counters and the status snapshot.
#[must_use]
pub fn health_check(
    start_time: Instant,
    connections: usize,
    snapshot: &StatusSnapshot,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        session_active: snapshot.session == vigil_core::SessionStatus::Active,
        connection_state: snapshot.connection,
    }
}

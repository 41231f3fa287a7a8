//! Gateway event types and shared status.
//!
//! Everything the gateway tells the outside world flows through
//! [`GatewayEvent`]: parsed readings, physical link health, and session
//! transitions. The wire format is internally tagged JSON
//! (`"type": "reading" | "connection-status" | "session-update"`) with
//! camelCase fields, matching what the dashboard consumes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::reading::Reading;

// ─────────────────────────────────────────────────────────────────────────────
// Connection state
// ─────────────────────────────────────────────────────────────────────────────

/// State of the physical serial link. Owned by the link manager; mirrored
/// into the shared status snapshot by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No link and no reconnect in progress (initial state, or after an
    /// explicit close).
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// The device is delivering bytes.
    Connected,
    /// The link was lost; reconnect attempts are running on backoff.
    Faulted,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session status
// ─────────────────────────────────────────────────────────────────────────────

/// Logical session state, independent of the physical link's
/// connect/disconnect cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No session has been started.
    Idle,
    /// A start request is authenticating with the cloud.
    Authenticating,
    /// Readings are attributed to this session and forwarded.
    Active,
    /// The session has ended (explicit stop, auth failure, or teardown).
    Ended,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire events
// ─────────────────────────────────────────────────────────────────────────────

/// One server→client event on the push channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// A parsed reading. `session_id` is `None` for live-preview readings
    /// produced while no session is active.
    #[serde(rename_all = "camelCase")]
    Reading {
        /// The parsed reading.
        reading: Reading,
        /// The session this reading is attributed to, if any.
        session_id: Option<SessionId>,
    },

    /// Physical link health changed.
    #[serde(rename_all = "camelCase")]
    ConnectionStatus {
        /// New link state.
        state: ConnectionState,
        /// When the transition happened.
        timestamp: DateTime<Utc>,
    },

    /// Session lifecycle transition.
    #[serde(rename_all = "camelCase")]
    SessionUpdate {
        /// New session status.
        status: SessionStatus,
        /// The session in question, if one exists.
        session_id: Option<SessionId>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared status snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Latest known gateway status, for synchronizing late subscribers.
///
/// A subscriber that connects after an event was broadcast never receives
/// it retroactively; instead it gets this snapshot's `connection-status`
/// on connect.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    /// Current link state.
    pub connection: ConnectionState,
    /// When the link entered that state.
    pub connection_since: DateTime<Utc>,
    /// Current session status.
    pub session: SessionStatus,
    /// The current (or most recent) session ID.
    pub session_id: Option<SessionId>,
}

impl StatusSnapshot {
    /// The `connection-status` event describing this snapshot.
    #[must_use]
    pub fn connection_event(&self) -> GatewayEvent {
        GatewayEvent::ConnectionStatus {
            state: self.connection,
            timestamp: self.connection_since,
        }
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            connection_since: Utc::now(),
            session: SessionStatus::Idle,
            session_id: None,
        }
    }
}

/// Cheaply clonable handle to the gateway's status snapshot.
///
/// Mutated only by the orchestrator in response to single events; read by
/// the server on subscriber connect and by the health endpoint.
#[derive(Clone, Default)]
pub struct SharedStatus(Arc<Mutex<StatusSnapshot>>);

impl SharedStatus {
    /// New shared status in the initial (Disconnected / Idle) state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.0.lock().clone()
    }

    /// Record a link state transition and return the event to broadcast.
    pub fn set_connection(&self, state: ConnectionState) -> GatewayEvent {
        let now = Utc::now();
        let mut guard = self.0.lock();
        guard.connection = state;
        guard.connection_since = now;
        GatewayEvent::ConnectionStatus {
            state,
            timestamp: now,
        }
    }

    /// Record a session transition and return the event to broadcast.
    pub fn set_session(
        &self,
        status: SessionStatus,
        session_id: Option<SessionId>,
    ) -> GatewayEvent {
        let mut guard = self.0.lock();
        guard.session = status;
        guard.session_id.clone_from(&session_id);
        GatewayEvent::SessionUpdate { status, session_id }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

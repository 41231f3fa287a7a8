//! Event fan-out to connected WebSocket clients.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use vigil_core::{ConnectionId, GatewayEvent};

use crate::connection::ClientConnection;

/// The set of connected subscribers, and best-effort delivery to them.
///
/// Membership changes on connect and disconnect; there is no ordering
/// between subscribers. A subscriber whose channel turns out to be closed
/// is removed during a broadcast without affecting the others.
pub struct BroadcastManager {
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
}

impl BroadcastManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        let _ = conns.insert(connection.id.clone(), connection);
    }

    /// Remove a connection by ID.
    pub async fn remove(&self, connection_id: &ConnectionId) {
        let mut conns = self.connections.write().await;
        let _ = conns.remove(connection_id);
    }

    /// Broadcast an event to every connected subscriber.
    ///
    /// The event is serialized once and shared. A full client channel
    /// drops the event for that client only; a closed channel gets the
    /// subscriber removed.
    pub async fn broadcast(&self, event: &GatewayEvent) {
        let json = match serde_json::to_string(event) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize event");
                return;
            }
        };

        let mut closed = Vec::new();
        {
            let conns = self.connections.read().await;
            for conn in conns.values() {
                if !conn.send(json.clone()) && conn.is_closed() {
                    closed.push(conn.id.clone());
                }
            }
        }

        if !closed.is_empty() {
            let mut conns = self.connections.write().await;
            for id in &closed {
                if conns.remove(id).is_some() {
                    debug!(conn_id = %id, "removed closed subscriber");
                }
            }
        }
    }

    /// Number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

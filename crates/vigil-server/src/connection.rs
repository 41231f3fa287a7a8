//! WebSocket client connection state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use vigil_core::ConnectionId;

/// A connected push-channel subscriber.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Count of events dropped because the channel was full.
    dropped_events: AtomicU64,
}

impl ClientConnection {
    /// Create a connection around the write task's channel.
    #[must_use]
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            dropped_events: AtomicU64::new(0),
        }
    }

    /// Send a serialized event to the client.
    ///
    /// Best-effort: returns `false` if the channel is full or closed, and
    /// counts the drop. A slow client loses events rather than slowing
    /// the gateway down.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_events.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Whether the client's write task has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Total events dropped for this connection.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Connection age.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

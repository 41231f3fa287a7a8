//! Bridge from the runtime's broadcast channel to connected sockets.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vigil_core::GatewayEvent;

use crate::broadcast::BroadcastManager;

/// Spawn the task that pumps gateway events into the subscriber set.
///
/// A lagged receiver (the server fell behind the runtime) skips the
/// missed events and keeps going; subscribers simply never see them.
pub fn spawn_event_bridge(
    mut events: broadcast::Receiver<GatewayEvent>,
    manager: Arc<BroadcastManager>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                next = events.recv() => match next {
                    Ok(event) => manager.broadcast(&event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "event bridge lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
        debug!("event bridge stopped");
    })
}

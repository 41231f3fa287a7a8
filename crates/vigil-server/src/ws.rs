//! `/ws` — the push channel.
//!
//! One socket per dashboard client. The server never expects payloads
//! from the client; inbound frames other than Close are ignored. Each
//! client gets its own bounded outbound channel, seeded with the current
//! `connection-status` snapshot before the connection joins the
//! subscriber set, so the snapshot is always the first event delivered.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use vigil_core::ConnectionId;

use crate::connection::ClientConnection;
use crate::server::AppState;

/// GET /ws — upgrade to the push channel.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = ConnectionId::new();
    let (tx, mut outbound) = mpsc::channel(state.client_buffer);
    let conn = Arc::new(ClientConnection::new(id.clone(), tx));

    // Seed the channel before joining the set: the snapshot must precede
    // any broadcast event this client sees.
    let snapshot = state.status.snapshot().connection_event();
    match serde_json::to_string(&snapshot) {
        Ok(json) => {
            let _ = conn.send(Arc::new(json));
        }
        Err(e) => warn!(error = %e, "failed to serialize status snapshot"),
    }
    state.broadcast.add(conn).await;
    info!(conn_id = %id, "subscriber connected");

    let (mut sink, mut stream) = socket.split();
    let cancel = state.cancel.clone();
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            event = outbound.recv() => match event {
                Some(text) => {
                    if sink.send(Message::Text((*text).clone().into())).await.is_err() {
                        debug!(conn_id = %id, "socket write failed");
                        break;
                    }
                }
                None => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Push-only channel; other inbound frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    state.broadcast.remove(&id).await;
    info!(conn_id = %id, "subscriber disconnected");
}

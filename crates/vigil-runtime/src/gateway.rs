//! Gateway orchestrator.
//!
//! One event loop consumes the link's event stream: byte chunks feed the
//! frame parser, parsed readings update `last_reading` and fan out to the
//! broadcast channel (always) and the telemetry forwarder (only while a
//! session is active); link state transitions update the shared snapshot
//! and fan out as `connection-status` events. Session transitions are
//! published by the controller itself, so every external consumer sees
//! one ordered stream.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_cloud::{
    CloudClient, CloudConfig, Credentials, ForwarderConfig, SessionController, TelemetryForwarder,
};
use vigil_core::{
    DeviceId, FrameOutcome, FrameParser, FrameParserConfig, GatewayEvent, Reading, SessionError,
    SessionId, SharedStatus, StatusSnapshot,
};
use vigil_link::{LinkConfig, LinkEvent, LinkManager, PortOpener};

/// Capacity of the internal link event channel.
const LINK_CHANNEL_CAPACITY: usize = 64;
/// Capacity of the outbound broadcast channel. A subscriber that lags
/// behind this many events starts losing the oldest ones.
const BROADCAST_CAPACITY: usize = 256;

/// Everything the orchestrator needs to run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// The device readings are attributed to.
    pub device_id: DeviceId,
    /// Serial link settings.
    pub link: LinkConfig,
    /// Frame parser tuning.
    #[serde(default)]
    pub parser: FrameParserConfig,
    /// Cloud backend settings.
    pub cloud: CloudConfig,
    /// Forwarder tuning.
    #[serde(default)]
    pub forwarder: ForwarderConfig,
}

/// Handle to the running gateway.
///
/// Owns the background tasks (link supervisor, event loop, forwarder
/// drain). [`Gateway::shutdown`] tears everything down in order.
pub struct Gateway {
    device_id: DeviceId,
    status: SharedStatus,
    events: broadcast::Sender<GatewayEvent>,
    session: Arc<SessionController>,
    forwarder: TelemetryForwarder,
    client: CloudClient,
    last_reading: Arc<Mutex<Option<Reading>>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Wire up and start the gateway's background tasks.
    ///
    /// The opener is injected so tests can script link behavior; the
    /// binary passes the real serial opener.
    pub fn start(config: GatewayConfig, opener: Arc<dyn PortOpener>) -> Self {
        let status = SharedStatus::new();
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        let client = CloudClient::new(&config.cloud);
        let session = Arc::new(SessionController::new(
            client.clone(),
            status.clone(),
            events.clone(),
        ));
        let forwarder = TelemetryForwarder::new(config.forwarder.clone());
        let last_reading = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let (link_tx, link_rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        let link = LinkManager::new(opener, config.link.clone(), link_tx, cancel.child_token());

        let parser = FrameParser::new(config.device_id.clone(), config.parser.clone());
        let tasks = vec![
            link.spawn(),
            forwarder.spawn(client.clone(), session.clone(), cancel.child_token()),
            tokio::spawn(event_loop(
                link_rx,
                parser,
                status.clone(),
                events.clone(),
                forwarder.clone(),
                session.clone(),
                last_reading.clone(),
            )),
        ];

        info!(device_id = %config.device_id, path = %config.link.path, "gateway started");
        Self {
            device_id: config.device_id,
            status,
            events,
            session,
            forwarder,
            client,
            last_reading,
            cancel,
            tasks,
        }
    }

    /// Subscribe to the gateway's event stream.
    ///
    /// Delivery is best-effort from this point on; nothing broadcast
    /// before the subscription is replayed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.events.subscribe()
    }

    /// Handle to the shared status snapshot.
    #[must_use]
    pub fn shared_status(&self) -> SharedStatus {
        self.status.clone()
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// The most recent successfully parsed reading, if any.
    #[must_use]
    pub fn last_reading(&self) -> Option<Reading> {
        self.last_reading.lock().clone()
    }

    /// Readings lost to queue overflow so far.
    #[must_use]
    pub fn dropped_readings(&self) -> u64 {
        self.forwarder.dropped()
    }

    /// Whether a session is currently active.
    pub async fn session_active(&self) -> bool {
        self.session.is_active().await
    }

    /// Start a monitoring session with the configured device identity.
    pub async fn start_session(&self, secret: String) -> Result<SessionId, SessionError> {
        // A reading parsed concurrently with the previous end can slip
        // into the queue after its final flush; it must not be delivered
        // under the next session's ID.
        if !self.session.is_active().await {
            self.forwarder.clear();
        }
        self.session
            .start(Credentials {
                device_id: self.device_id.clone(),
                secret,
            })
            .await
    }

    /// End the active session.
    ///
    /// Readings already queued get one best-effort delivery pass under
    /// the ended session's token; anything still undelivered afterwards
    /// is discarded. New readings are no longer enqueued (the event loop
    /// sees no active session).
    pub async fn end_session(&self) -> Result<SessionId, SessionError> {
        let ended = self.session.end().await?;
        self.forwarder.flush_once(&self.client, &ended).await;
        Ok(ended.id)
    }

    /// Stop everything, in order: close the link (cancelling any backoff
    /// timer), end an active session with its final flush, then wait for
    /// the background tasks to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Ok(ended) = self.session.end().await {
            self.forwarder.flush_once(&self.client, &ended).await;
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "gateway task aborted");
            }
        }
        info!("gateway stopped");
    }
}

/// The single ordered event loop.
async fn event_loop(
    mut link_rx: mpsc::Receiver<LinkEvent>,
    mut parser: FrameParser,
    status: SharedStatus,
    events: broadcast::Sender<GatewayEvent>,
    forwarder: TelemetryForwarder,
    session: Arc<SessionController>,
    last_reading: Arc<Mutex<Option<Reading>>>,
) {
    while let Some(event) = link_rx.recv().await {
        match event {
            LinkEvent::State(state) => {
                let event = status.set_connection(state);
                let _ = events.send(event);
            }
            LinkEvent::Data(chunk) => {
                for outcome in parser.push(&chunk) {
                    match outcome {
                        FrameOutcome::Reading(reading) => {
                            *last_reading.lock() = Some(reading.clone());
                            let session_id = session.active().await.map(|(id, _)| id);
                            if session_id.is_some() {
                                forwarder.enqueue(reading.clone());
                            }
                            let _ = events.send(GatewayEvent::Reading {
                                reading,
                                session_id,
                            });
                        }
                        FrameOutcome::Error(e) => {
                            warn!(error = %e, "frame discarded");
                        }
                    }
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

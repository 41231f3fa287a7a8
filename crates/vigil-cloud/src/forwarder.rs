//! Telemetry forwarder — buffered, batched, at-least-once cloud delivery.
//!
//! `enqueue` never blocks the caller: readings land in the bounded
//! [`PendingQueue`] (drop-oldest on overflow) and a background task drains
//! it. A batch stays queued until the cloud confirms it, so a timeout
//! after the server committed can resend the batch — at-least-once, not
//! exactly-once. Order is preserved; overflow may introduce gaps.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vigil_core::{Reading, RetryPolicy};

use crate::client::{CloudClient, CloudError};
use crate::queue::PendingQueue;
use crate::session::{EndedSession, SessionController};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
/// Default delivery batch size.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Forwarder tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwarderConfig {
    /// Bounded queue capacity (drop-oldest beyond this).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Max readings per delivery request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Backoff schedule for transient delivery failures.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

struct Inner {
    queue: Mutex<PendingQueue>,
    notify: Notify,
    config: ForwarderConfig,
}

/// Handle to the pending queue plus its background delivery task.
///
/// Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct TelemetryForwarder {
    inner: Arc<Inner>,
}

impl TelemetryForwarder {
    /// Create a forwarder (the drain task is started with [`Self::spawn`]).
    #[must_use]
    pub fn new(config: ForwarderConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(PendingQueue::new(config.queue_capacity)),
                notify: Notify::new(),
                config,
            }),
        }
    }

    /// Append a reading for delivery. Never blocks; on overflow the
    /// oldest queued reading is evicted and logged as data loss.
    pub fn enqueue(&self, reading: Reading) {
        let evicted = self.inner.queue.lock().push(reading);
        if let Some(lost) = evicted {
            warn!(timestamp = %lost.timestamp, "pending queue full, dropped oldest reading");
        }
        self.inner.notify.notify_one();
    }

    /// Number of readings awaiting delivery.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Total readings lost to overflow.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.queue.lock().dropped()
    }

    /// Discard everything still queued.
    pub fn clear(&self) {
        self.inner.queue.lock().clear();
    }

    /// Start the background drain task.
    pub fn spawn(
        &self,
        client: CloudClient,
        session: Arc<SessionController>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let forwarder = self.clone();
        tokio::spawn(forwarder.run(client, session, cancel))
    }

    /// Drain loop: batch, deliver, confirm; back off on transient
    /// failure; one re-auth on token expiry. A second rejection for the
    /// same batch means the credentials are no longer good, so the
    /// session ends rather than re-authing in a loop.
    async fn run(
        self,
        client: CloudClient,
        session: Arc<SessionController>,
        cancel: CancellationToken,
    ) {
        let mut attempt: u32 = 0;
        // Whether the pending batch already went out on a refreshed token.
        let mut refreshed = false;
        loop {
            // Created before the state checks so an enqueue racing us
            // cannot be missed.
            let notified = self.inner.notify.notified();

            let Some((session_id, token)) = session.active().await else {
                // Queued leftovers with no active session are handled by
                // the orchestrator's final flush; just wait.
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = notified => {}
                }
                continue;
            };

            // Peeked only after the session lookup: a session start
            // clears stale leftovers before it goes Active, so the batch
            // seen here belongs to the session the token is for.
            let batch = self
                .inner
                .queue
                .lock()
                .peek_batch(self.inner.config.batch_size);
            if batch.is_empty() {
                attempt = 0;
                refreshed = false;
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = notified => {}
                }
                continue;
            }

            let device_id = batch[0].device_id.clone();
            match client
                .push_readings(&token, &device_id, &session_id, &batch)
                .await
            {
                Ok(()) => {
                    self.inner.queue.lock().pop_front_n(batch.len());
                    attempt = 0;
                    refreshed = false;
                    debug!(batch = batch.len(), "batch delivered");
                }
                Err(CloudError::Unauthorized) if !refreshed => match session.refresh().await {
                    // Same pending batch goes out again with the fresh
                    // token on the next iteration.
                    Ok(_) => {
                        refreshed = true;
                        debug!("token refreshed, retrying pending batch");
                    }
                    Err(e) => {
                        warn!(error = %e, "delivery stopped, session ended");
                        self.clear();
                    }
                },
                Err(CloudError::Unauthorized) => {
                    // A token issued moments ago was rejected too.
                    warn!("fresh token rejected, ending session");
                    session.fail("fresh token rejected").await;
                    self.clear();
                    refreshed = false;
                }
                Err(e) => {
                    let delay = self.inner.config.retry.delay(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64,
                        "delivery failed, backing off");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// One best-effort delivery pass for a session that just ended, then
    /// discard whatever is left.
    ///
    /// Each remaining batch is attempted once; the first failure abandons
    /// the rest.
    pub async fn flush_once(&self, client: &CloudClient, ended: &EndedSession) {
        loop {
            let batch = self
                .inner
                .queue
                .lock()
                .peek_batch(self.inner.config.batch_size);
            if batch.is_empty() {
                break;
            }
            let device_id = batch[0].device_id.clone();
            match client
                .push_readings(&ended.token, &device_id, &ended.id, &batch)
                .await
            {
                Ok(()) => {
                    self.inner.queue.lock().pop_front_n(batch.len());
                    debug!(batch = batch.len(), "final batch delivered");
                }
                Err(e) => {
                    warn!(error = %e, remaining = self.queued(), "final flush abandoned");
                    break;
                }
            }
        }
        self.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

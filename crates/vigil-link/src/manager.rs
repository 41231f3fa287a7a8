//! Link manager — owns the serial device lifecycle.
//!
//! A single supervisor task opens the port, pumps byte chunks to the
//! orchestrator, and on any failure schedules reconnect attempts on
//! exponential backoff. Open failures and read errors never surface as
//! hard failures; they loop (logged) until success or cancellation.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_core::{ConnectionState, RetryPolicy};

use crate::port::PortOpener;

/// Serial link settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub path: String,
    /// Baud rate, e.g. `9600`.
    pub baud_rate: u32,
    /// Reconnect backoff schedule.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// What the link manager tells the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The link changed state. Emitted only on transitions, never
    /// repeated for consecutive failed open attempts.
    State(ConnectionState),
    /// Raw bytes from the device, in arrival order.
    Data(Bytes),
}

/// Supervisor for the physical serial link.
///
/// Cancelling the token is the `close()` operation: it cancels any pending
/// backoff timer, drops the port handle, emits a final `Disconnected`, and
/// ends the task.
pub struct LinkManager {
    opener: Arc<dyn PortOpener>,
    config: LinkConfig,
    events: mpsc::Sender<LinkEvent>,
    cancel: CancellationToken,
}

impl LinkManager {
    /// Create a manager that reports through `events`.
    pub fn new(
        opener: Arc<dyn PortOpener>,
        config: LinkConfig,
        events: mpsc::Sender<LinkEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            opener,
            config,
            events,
            cancel,
        }
    }

    /// Spawn the supervisor task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the open/read/reconnect loop until cancelled.
    pub async fn run(self) {
        let mut state = ConnectionState::Disconnected;
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.transition(&mut state, ConnectionState::Connecting).await;

            let open = tokio::select! {
                () = self.cancel.cancelled() => break,
                open = self.opener.open(&self.config.path, self.config.baud_rate) => open,
            };

            match open {
                Ok(mut port) => {
                    attempt = 0;
                    info!(path = %self.config.path, baud = self.config.baud_rate, "link connected");
                    self.transition(&mut state, ConnectionState::Connected).await;

                    loop {
                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                self.transition(&mut state, ConnectionState::Disconnected).await;
                                return;
                            }
                            chunk = port.read_chunk() => match chunk {
                                Ok(bytes) => {
                                    if self.events.send(LinkEvent::Data(bytes)).await.is_err() {
                                        // Orchestrator gone; nothing left to feed.
                                        return;
                                    }
                                }
                                Err(e) => {
                                    warn!(path = %self.config.path, error = %e, "link lost");
                                    break;
                                }
                            }
                        }
                    }

                    // Faulted must reach subscribers before any reconnect
                    // attempt begins.
                    self.transition(&mut state, ConnectionState::Faulted).await;
                }
                Err(e) => {
                    debug!(path = %self.config.path, attempt, error = %e, "link open failed");
                }
            }

            let delay = self.config.retry.delay(attempt);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.transition(&mut state, ConnectionState::Disconnected).await;
    }

    async fn transition(&self, state: &mut ConnectionState, next: ConnectionState) {
        if *state == next {
            return;
        }
        *state = next;
        let _ = self.events.send(LinkEvent::State(next)).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::port::LinkPort;
    use vigil_core::LinkError;

    /// A port that plays back a script, then blocks forever.
    struct ScriptedPort {
        script: VecDeque<Result<Bytes, LinkError>>,
    }

    #[async_trait]
    impl LinkPort for ScriptedPort {
        async fn read_chunk(&mut self) -> Result<Bytes, LinkError> {
            match self.script.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }
    }

    /// Opener that plays back a script of open outcomes; after the script
    /// is exhausted, every open fails.
    struct ScriptedOpener {
        script: Mutex<VecDeque<Result<VecDeque<Result<Bytes, LinkError>>, ()>>>,
    }

    impl ScriptedOpener {
        fn new(script: Vec<Result<Vec<Result<Bytes, LinkError>>, ()>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|entry| entry.map(Into::into))
                        .collect(),
                ),
            })
        }
    }

    #[async_trait]
    impl PortOpener for ScriptedOpener {
        async fn open(&self, path: &str, _baud_rate: u32) -> Result<Box<dyn LinkPort>, LinkError> {
            let next = self.script.lock().pop_front();
            match next {
                Some(Ok(script)) => Ok(Box::new(ScriptedPort { script })),
                _ => Err(LinkError::Unavailable {
                    path: path.to_owned(),
                    reason: "scripted failure".into(),
                }),
            }
        }
    }

    fn config() -> LinkConfig {
        LinkConfig {
            path: "/dev/ttyFAKE".into(),
            baud_rate: 9600,
            retry: RetryPolicy::default(),
        }
    }

    async fn next_state(rx: &mut mpsc::Receiver<LinkEvent>) -> ConnectionState {
        loop {
            match rx.recv().await.expect("event stream ended") {
                LinkEvent::State(s) => return s,
                LinkEvent::Data(_) => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connects_on_first_try() {
        let opener = ScriptedOpener::new(vec![Ok(vec![])]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let handle = LinkManager::new(opener, config(), tx, cancel.clone()).spawn();

        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);

        cancel.cancel();
        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_retries_after_backoff() {
        // First open fails, the device appears during the backoff window,
        // next attempt succeeds.
        let opener = ScriptedOpener::new(vec![Err(()), Ok(vec![])]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();
        let _handle = LinkManager::new(opener, config(), tx, cancel.clone()).spawn();

        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        // No Faulted and no repeated Connecting for a failed open: next
        // transition is Connected, after roughly the base delay.
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500), "retried too early: {elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1100), "retried too late: {elapsed:?}");

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn data_chunks_flow_in_order() {
        let opener = ScriptedOpener::new(vec![Ok(vec![
            Ok(Bytes::from_static(b"23.5,")),
            Ok(Bytes::from_static(b"61.2\n")),
        ])]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let _handle = LinkManager::new(opener, config(), tx, cancel.clone()).spawn();

        let mut data = Vec::new();
        for _ in 0..4 {
            match rx.recv().await.unwrap() {
                LinkEvent::Data(bytes) => data.extend_from_slice(&bytes),
                LinkEvent::State(_) => {}
            }
            if data.ends_with(b"\n") {
                break;
            }
        }
        assert_eq!(data, b"23.5,61.2\n");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn read_error_faults_then_reconnects() {
        let opener = ScriptedOpener::new(vec![
            Ok(vec![Ok(Bytes::from_static(b"1.0\n")), Err(LinkError::Disconnected)]),
            Ok(vec![]),
        ]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let _handle = LinkManager::new(opener, config(), tx, cancel.clone()).spawn();

        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);
        // Faulted is emitted before the reconnect attempt begins.
        assert_eq!(next_state(&mut rx).await, ConnectionState::Faulted);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_cleanly() {
        // Every open fails; the manager sits in backoff.
        let opener = ScriptedOpener::new(vec![]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let handle = LinkManager::new(opener, config(), tx, cancel.clone()).spawn();

        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        // Let it fail at least once and enter backoff.
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        assert_eq!(next_state(&mut rx).await, ConnectionState::Disconnected);
        handle.await.unwrap();
        // No further events after shutdown.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_open_failures_do_not_repeat_connecting() {
        let opener = ScriptedOpener::new(vec![Err(()), Err(()), Err(()), Ok(vec![])]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let _handle = LinkManager::new(opener, config(), tx, cancel.clone()).spawn();

        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        // Three failures and their backoffs later, straight to Connected.
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);
        cancel.cancel();
    }
}

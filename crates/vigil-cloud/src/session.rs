//! Session lifecycle, independent of the physical link.
//!
//! State machine: `Idle → Authenticating → Active → Ended`, with
//! `→ Ended` directly when authentication fails. At most one session is
//! Active at a time; the auth token is obtained once at start and cached
//! for the session's lifetime, with a single re-authentication attempt
//! when the cloud signals expiry mid-session.
//!
//! Every transition updates the shared status snapshot and publishes a
//! `session-update` event.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tracing::{info, warn};

use vigil_core::{GatewayEvent, SessionError, SessionId, SessionStatus, SharedStatus};

use crate::client::{CloudClient, Credentials};

/// A session that has ended, carrying what the final best-effort flush of
/// queued readings needs. The controller no longer holds the token.
#[derive(Clone, Debug)]
pub struct EndedSession {
    /// The session that ended.
    pub id: SessionId,
    /// The token that was cached for it (still accepted best-effort).
    pub token: String,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When it ended.
    pub ended_at: DateTime<Utc>,
}

struct ActiveSession {
    id: SessionId,
    token: String,
    started_at: DateTime<Utc>,
    /// Original credentials, kept for the one re-auth attempt on expiry.
    credentials: Credentials,
}

struct Inner {
    status: SessionStatus,
    active: Option<ActiveSession>,
}

/// Tracks the logical monitoring session.
pub struct SessionController {
    client: CloudClient,
    status: SharedStatus,
    events: broadcast::Sender<GatewayEvent>,
    inner: Mutex<Inner>,
}

impl SessionController {
    /// Create a controller publishing transitions through `events`.
    pub fn new(
        client: CloudClient,
        status: SharedStatus,
        events: broadcast::Sender<GatewayEvent>,
    ) -> Self {
        Self {
            client,
            status,
            events,
            inner: Mutex::new(Inner {
                status: SessionStatus::Idle,
                active: None,
            }),
        }
    }

    /// Start a session: authenticate with the cloud and transition to
    /// Active.
    ///
    /// Fails with [`SessionError::AlreadyActive`] (leaving the existing
    /// session untouched) or [`SessionError::AuthenticationFailed`]
    /// (transitioning to Ended).
    pub async fn start(&self, credentials: Credentials) -> Result<SessionId, SessionError> {
        // The lock is held across the auth round-trip so a second start
        // cannot interleave with an in-flight one.
        let mut inner = self.inner.lock().await;
        if inner.status == SessionStatus::Active {
            return Err(SessionError::AlreadyActive);
        }

        inner.status = SessionStatus::Authenticating;
        self.emit(SessionStatus::Authenticating, None);

        match self.client.authenticate(&credentials).await {
            Ok(token) => {
                let id = SessionId::new();
                inner.active = Some(ActiveSession {
                    id: id.clone(),
                    token,
                    started_at: Utc::now(),
                    credentials,
                });
                inner.status = SessionStatus::Active;
                self.emit(SessionStatus::Active, Some(id.clone()));
                info!(session_id = %id, "session started");
                Ok(id)
            }
            Err(e) => {
                inner.status = SessionStatus::Ended;
                inner.active = None;
                self.emit(SessionStatus::Ended, None);
                warn!(error = %e, "session start rejected");
                Err(SessionError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// End the Active session, invalidating the cached token.
    ///
    /// Returns the ended session so the forwarder can flush what is
    /// already queued, best-effort, once. Not-Active is reported as
    /// [`SessionError::NotActive`] — a no-op, not a fault.
    pub async fn end(&self) -> Result<EndedSession, SessionError> {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.active.take() else {
            return Err(SessionError::NotActive);
        };
        inner.status = SessionStatus::Ended;
        let ended = EndedSession {
            id: active.id,
            token: active.token,
            started_at: active.started_at,
            ended_at: Utc::now(),
        };
        self.emit(SessionStatus::Ended, Some(ended.id.clone()));
        info!(session_id = %ended.id, "session ended");
        Ok(ended)
    }

    /// One re-authentication with the original credentials after the
    /// cloud signalled token expiry.
    ///
    /// On success the fresh token replaces the cached one and delivery
    /// resumes. On failure the session ends with `AuthenticationFailed`.
    pub async fn refresh(&self) -> Result<String, SessionError> {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.active.as_mut() else {
            return Err(SessionError::NotActive);
        };

        match self.client.authenticate(&active.credentials).await {
            Ok(token) => {
                active.token.clone_from(&token);
                info!(session_id = %active.id, "session token refreshed");
                Ok(token)
            }
            Err(e) => {
                let id = inner.active.take().map(|a| a.id);
                inner.status = SessionStatus::Ended;
                self.emit(SessionStatus::Ended, id);
                warn!(error = %e, "re-authentication failed, ending session");
                Err(SessionError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// End the Active session after an unrecoverable authentication
    /// failure, such as the cloud rejecting a freshly issued token.
    ///
    /// A no-op when nothing is active. No flush follows; the caller
    /// discards any queued readings since the token is useless.
    pub async fn fail(&self, reason: &str) {
        let mut inner = self.inner.lock().await;
        let Some(active) = inner.active.take() else {
            return;
        };
        inner.status = SessionStatus::Ended;
        self.emit(SessionStatus::Ended, Some(active.id.clone()));
        warn!(session_id = %active.id, reason, "session ended");
    }

    /// The Active session's ID and current token, if any.
    pub async fn active(&self) -> Option<(SessionId, String)> {
        let inner = self.inner.lock().await;
        inner
            .active
            .as_ref()
            .map(|a| (a.id.clone(), a.token.clone()))
    }

    /// Whether a session is currently Active.
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.status == SessionStatus::Active
    }

    /// Current session status.
    pub async fn status(&self) -> SessionStatus {
        self.inner.lock().await.status
    }

    fn emit(&self, status: SessionStatus, id: Option<SessionId>) {
        let event = self.status.set_session(status, id);
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::client::CloudConfig;
    use vigil_core::DeviceId;

    fn credentials() -> Credentials {
        Credentials {
            device_id: DeviceId::from("dev-1"),
            secret: "hunter2".into(),
        }
    }

    fn controller_for(server: &MockServer) -> (SessionController, broadcast::Receiver<GatewayEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let client = CloudClient::new(&CloudConfig {
            base_url: server.uri(),
        });
        (
            SessionController::new(client, SharedStatus::new(), tx),
            rx,
        )
    }

    async fn mount_auth_ok(server: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": token,
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn start_transitions_to_active() {
        let server = MockServer::start().await;
        mount_auth_ok(&server, "tok-1").await;
        let (controller, mut rx) = controller_for(&server);

        let id = controller.start(credentials()).await.unwrap();
        assert!(controller.is_active().await);
        assert_eq!(
            controller.active().await,
            Some((id.clone(), "tok-1".into()))
        );

        // Authenticating then Active updates were published.
        assert_matches!(
            rx.recv().await.unwrap(),
            GatewayEvent::SessionUpdate {
                status: SessionStatus::Authenticating,
                session_id: None,
            }
        );
        assert_matches!(
            rx.recv().await.unwrap(),
            GatewayEvent::SessionUpdate {
                status: SessionStatus::Active,
                session_id: Some(got),
            } if got == id
        );
    }

    #[tokio::test]
    async fn start_while_active_fails_and_leaves_session_unchanged() {
        let server = MockServer::start().await;
        mount_auth_ok(&server, "tok-1").await;
        let (controller, _rx) = controller_for(&server);

        let id = controller.start(credentials()).await.unwrap();
        let err = controller.start(credentials()).await.unwrap_err();
        assert_matches!(err, SessionError::AlreadyActive);
        // The original session is untouched.
        assert_eq!(controller.active().await, Some((id, "tok-1".into())));
    }

    #[tokio::test]
    async fn start_auth_rejected_ends_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let (controller, _rx) = controller_for(&server);

        let err = controller.start(credentials()).await.unwrap_err();
        assert_matches!(err, SessionError::AuthenticationFailed { .. });
        assert_eq!(controller.status().await, SessionStatus::Ended);
        assert!(controller.active().await.is_none());
    }

    #[tokio::test]
    async fn start_unreachable_backend_ends_session() {
        let client = CloudClient::new(&CloudConfig {
            base_url: "http://127.0.0.1:1".into(),
        });
        let (tx, _rx) = broadcast::channel(8);
        let controller = SessionController::new(client, SharedStatus::new(), tx);

        let err = controller.start(credentials()).await.unwrap_err();
        assert_matches!(err, SessionError::AuthenticationFailed { .. });
        assert_eq!(controller.status().await, SessionStatus::Ended);
    }

    #[tokio::test]
    async fn end_returns_session_for_final_flush() {
        let server = MockServer::start().await;
        mount_auth_ok(&server, "tok-1").await;
        let (controller, _rx) = controller_for(&server);

        let id = controller.start(credentials()).await.unwrap();
        let ended = controller.end().await.unwrap();
        assert_eq!(ended.id, id);
        assert_eq!(ended.token, "tok-1");
        assert!(ended.ended_at >= ended.started_at);
        assert!(!controller.is_active().await);
    }

    #[tokio::test]
    async fn end_without_active_session_is_reported() {
        let server = MockServer::start().await;
        let (controller, _rx) = controller_for(&server);
        assert_matches!(controller.end().await, Err(SessionError::NotActive));
    }

    #[tokio::test]
    async fn restart_after_end_is_allowed() {
        let server = MockServer::start().await;
        mount_auth_ok(&server, "tok-1").await;
        let (controller, _rx) = controller_for(&server);

        let first = controller.start(credentials()).await.unwrap();
        let _ = controller.end().await.unwrap();
        let second = controller.start(credentials()).await.unwrap();
        assert_ne!(first, second);
        assert!(controller.is_active().await);
    }

    #[tokio::test]
    async fn refresh_replaces_token() {
        let server = MockServer::start().await;
        // First auth yields tok-1, subsequent auths yield tok-2.
        Mock::given(method("POST"))
            .and(path("/v1/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "tok-1",
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "tok-2",
            })))
            .mount(&server)
            .await;

        let (controller, _rx) = controller_for(&server);
        let id = controller.start(credentials()).await.unwrap();
        let token = controller.refresh().await.unwrap();
        assert_eq!(token, "tok-2");
        assert_eq!(controller.active().await, Some((id, "tok-2".into())));
    }

    #[tokio::test]
    async fn refresh_failure_ends_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "tok-1",
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (controller, _rx) = controller_for(&server);
        let _ = controller.start(credentials()).await.unwrap();
        let err = controller.refresh().await.unwrap_err();
        assert_matches!(err, SessionError::AuthenticationFailed { .. });
        assert_eq!(controller.status().await, SessionStatus::Ended);
        assert!(controller.active().await.is_none());
    }

    #[tokio::test]
    async fn fail_ends_active_session() {
        let server = MockServer::start().await;
        mount_auth_ok(&server, "tok-1").await;
        let (controller, mut rx) = controller_for(&server);

        let id = controller.start(credentials()).await.unwrap();
        controller.fail("token rejected").await;
        assert_eq!(controller.status().await, SessionStatus::Ended);
        assert!(controller.active().await.is_none());

        // Authenticating, Active, then the terminal Ended update.
        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        assert_matches!(
            last,
            Some(GatewayEvent::SessionUpdate {
                status: SessionStatus::Ended,
                session_id: Some(got),
            }) if got == id
        );
    }

    #[tokio::test]
    async fn fail_without_session_is_noop() {
        let server = MockServer::start().await;
        let (controller, _rx) = controller_for(&server);
        controller.fail("nothing to end").await;
        assert_eq!(controller.status().await, SessionStatus::Idle);
    }

    #[tokio::test]
    async fn refresh_without_session_is_not_active() {
        let server = MockServer::start().await;
        let (controller, _rx) = controller_for(&server);
        assert_matches!(controller.refresh().await, Err(SessionError::NotActive));
    }
}

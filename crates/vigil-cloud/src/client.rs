//! HTTP client for the cloud backend.
//!
//! Two endpoints: credential → bearer token exchange, and bearer-
//! authenticated batch delivery of readings. A 401 means the token
//! expired (the caller re-authenticates once); any other non-2xx is
//! treated as transient and retried on backoff.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vigil_core::{DeviceId, Reading, SessionId};

/// Cloud backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    /// Backend base URL, e.g. `https://api.vigil.example`.
    pub base_url: String,
}

/// Device credentials presented at session start.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// The registered device.
    pub device_id: DeviceId,
    /// Shared secret for that device.
    pub secret: String,
}

/// Errors from cloud requests.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The token is expired or invalid (HTTP 401). Triggers one
    /// re-authentication.
    #[error("cloud rejected the bearer token")]
    Unauthorized,

    /// Any other non-2xx response. Retried on backoff, never surfaced
    /// past a log.
    #[error("cloud returned status {status}")]
    Transient {
        /// The HTTP status code.
        status: u16,
    },

    /// Transport-level failure (DNS, connect, timeout). Also transient.
    #[error("cloud request failed: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    device_id: &'a DeviceId,
    secret: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadingsRequest<'a> {
    device_id: &'a DeviceId,
    session_id: &'a SessionId,
    readings: &'a [Reading],
}

/// Client for the cloud backend's HTTP API.
#[derive(Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
}

impl CloudClient {
    /// Create a client for the given base URL (trailing slash tolerated).
    #[must_use]
    pub fn new(config: &CloudConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Exchange credentials for a bearer token.
    #[tracing::instrument(skip_all, fields(device_id = %credentials.device_id))]
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<String, CloudError> {
        let resp = self
            .http
            .post(format!("{}/v1/auth/token", self.base_url))
            .json(&AuthRequest {
                device_id: &credentials.device_id,
                secret: &credentials.secret,
            })
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(CloudError::Unauthorized);
        }
        if !status.is_success() {
            return Err(CloudError::Transient {
                status: status.as_u16(),
            });
        }

        let data: AuthResponse = resp.json().await?;
        debug!("authenticated with cloud backend");
        Ok(data.token)
    }

    /// Deliver a batch of readings under an active session.
    ///
    /// The batch is sent in original reading order; the backend sees the
    /// whole batch or none of it (from this client's perspective — a
    /// timeout after the server committed still reports failure, which is
    /// why delivery is at-least-once).
    #[tracing::instrument(skip_all, fields(session_id = %session_id, batch = readings.len()))]
    pub async fn push_readings(
        &self,
        token: &str,
        device_id: &DeviceId,
        session_id: &SessionId,
        readings: &[Reading],
    ) -> Result<(), CloudError> {
        let resp = self
            .http
            .post(format!("{}/v1/readings", self.base_url))
            .bearer_auth(token)
            .json(&ReadingsRequest {
                device_id,
                session_id,
                readings,
            })
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(CloudError::Unauthorized);
        }
        if !status.is_success() {
            return Err(CloudError::Transient {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

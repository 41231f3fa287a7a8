//! Layered settings for the gateway daemon.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If the settings file exists (`~/.vigil/settings.json` by default),
//!    merge its values over the defaults per-key
//! 3. Apply `VIGIL_*` environment variable overrides (highest priority)
//!
//! Environment keys mirror the JSON structure with `_` as the path
//! separator and the prefix `VIGIL_`: `VIGIL_SERVER_PORT` sets
//! `server.port`, `VIGIL_GATEWAY_LINK_PATH` sets `gateway.link.path`.
//! Matching is case-insensitive, so camel-cased fields are written
//! without a separator (`VIGIL_GATEWAY_DEVICEID`, `VIGIL_CLOUD_BASEURL`
//! via `VIGIL_GATEWAY_CLOUD_BASEURL`).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::debug;

use vigil_cloud::{CloudConfig, ForwarderConfig};
use vigil_core::{DeviceId, FrameParserConfig, RetryPolicy};
use vigil_link::LinkConfig;
use vigil_runtime::GatewayConfig;
use vigil_server::ServerConfig;

/// Everything the daemon needs to run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Gateway wiring: device identity, serial link, cloud, forwarder.
    pub gateway: GatewayConfig,
    /// Local HTTP/WebSocket server.
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                device_id: DeviceId::from("vigil-dev"),
                link: LinkConfig {
                    path: "/dev/ttyUSB0".into(),
                    baud_rate: 9600,
                    retry: RetryPolicy::default(),
                },
                parser: FrameParserConfig::default(),
                cloud: CloudConfig {
                    base_url: "https://api.vigil-health.example".into(),
                },
                forwarder: ForwarderConfig::default(),
            },
            server: ServerConfig::default(),
        }
    }
}

/// Resolve the path to the settings file (`~/.vigil/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".vigil").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus env overrides). If
/// the file contains invalid JSON or values of the wrong shape, returns
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings, figment::Error> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));
    if path.exists() {
        debug!(?path, "loading settings from file");
        figment = figment.merge(Json::file_exact(path));
    } else {
        debug!(?path, "settings file not found, using defaults");
    }
    figment.merge(Env::prefixed("VIGIL_").split("_")).extract()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

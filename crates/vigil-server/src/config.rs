//! Server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the local server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    #[serde(default)]
    pub port: u16,
    /// Per-client outbound channel capacity; a client that falls this far
    /// behind starts dropping events.
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_client_buffer() -> usize {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            client_buffer: default_client_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.client_buffer, 64);
    }

    #[test]
    fn missing_fields_fill_from_defaults() {
        let cfg: ServerConfig = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 9090,
            client_buffer: 16,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.port, cfg.port);
        assert_eq!(back.client_buffer, cfg.client_buffer);
    }
}

//! # vigil-gateway
//!
//! Gateway daemon binary — wires the serial link, the cloud forwarder,
//! and the local HTTP/WebSocket server together.

#![deny(unsafe_code)]

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vigil_link::SerialOpener;
use vigil_runtime::Gateway;
use vigil_server::VigilServer;

use settings::{load_settings_from_path, settings_path};

/// Vigil gateway daemon.
#[derive(Parser, Debug)]
#[command(name = "vigil-gateway", about = "Serial-to-cloud monitoring gateway")]
struct Cli {
    /// Path to the settings file (defaults to `~/.vigil/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device path (overrides settings).
    #[arg(long)]
    serial_path: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter, e.g. `info` or `vigil=debug` (overrides `RUST_LOG`).
    #[arg(long)]
    log: Option<String>,
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log.as_deref());

    let config_path = args.config.unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&config_path)
        .with_context(|| format!("Failed to load settings from {}", config_path.display()))?;
    if let Some(path) = args.serial_path {
        settings.gateway.link.path = path;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let gateway = Arc::new(Gateway::start(settings.gateway, Arc::new(SerialOpener)));
    let server = Arc::new(VigilServer::new(settings.server, gateway.clone()));

    let listener = server.bind().await.context("Failed to bind server")?;
    info!(addr = %listener.local_addr()?, "vigil gateway listening");

    let serve_task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    server.shutdown();
    serve_task
        .await
        .context("Server task panicked")?
        .context("Server error")?;

    // The serve task has released its handle; tear the gateway down last
    // so queued readings get their final delivery pass.
    drop(server);
    match Arc::try_unwrap(gateway) {
        Ok(gateway) => gateway.shutdown().await,
        Err(_) => warn!("gateway still referenced at shutdown, skipping final flush"),
    }

    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["vigil-gateway"]);
        assert_eq!(cli.config, None);
        assert_eq!(cli.serial_path, None);
        assert_eq!(cli.port, None);
        assert_eq!(cli.log, None);
    }

    #[test]
    fn cli_custom_config() {
        let cli = Cli::parse_from(["vigil-gateway", "--config", "/tmp/settings.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/settings.json")));
    }

    #[test]
    fn cli_serial_path_override() {
        let cli = Cli::parse_from(["vigil-gateway", "--serial-path", "/dev/ttyACM0"]);
        assert_eq!(cli.serial_path.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn cli_port_override() {
        let cli = Cli::parse_from(["vigil-gateway", "--port", "8080"]);
        assert_eq!(cli.port, Some(8080));
    }

    #[test]
    fn cli_log_filter() {
        let cli = Cli::parse_from(["vigil-gateway", "--log", "vigil=debug"]);
        assert_eq!(cli.log.as_deref(), Some("vigil=debug"));
    }
}

//! # vigil-server
//!
//! The gateway's local surface: an Axum HTTP + WebSocket server for the
//! dashboard on the same machine.
//!
//! - `/ws`: push channel; every subscriber gets the full event stream,
//!   starting with the current `connection-status` snapshot
//! - `/session/start`, `/session/stop`: session control
//! - `/health`: liveness and basic counters
//!
//! Events flow from the runtime's broadcast channel through the
//! [`bridge`] task into the [`BroadcastManager`], which fans them out to
//! the connected clients best-effort.

#![deny(unsafe_code)]

pub mod bridge;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod health;
pub mod server;
pub mod ws;

pub use broadcast::BroadcastManager;
pub use config::ServerConfig;
pub use connection::ClientConnection;
pub use server::VigilServer;

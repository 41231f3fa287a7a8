//! # vigil-cloud
//!
//! Everything that talks to (or buffers for) the cloud backend:
//!
//! - [`CloudClient`]: HTTP client for the auth and readings endpoints
//! - [`SessionController`]: the Idle → Authenticating → Active → Ended
//!   state machine, with single-shot token refresh on expiry
//! - [`PendingQueue`]: bounded FIFO of unsent readings, drop-oldest
//! - [`TelemetryForwarder`]: non-blocking enqueue plus a background drain
//!   task with batched, at-least-once delivery and backoff retry

#![deny(unsafe_code)]

pub mod client;
pub mod forwarder;
pub mod queue;
pub mod session;

pub use client::{CloudClient, CloudConfig, CloudError, Credentials};
pub use forwarder::{ForwarderConfig, TelemetryForwarder};
pub use queue::PendingQueue;
pub use session::{EndedSession, SessionController};

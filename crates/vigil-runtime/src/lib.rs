//! # vigil-runtime
//!
//! The gateway orchestrator: one event loop tying the serial link, the
//! frame parser, the session controller, and the telemetry forwarder
//! together.
//!
//! - **Gateway**: owns the background tasks and the broadcast channel;
//!   the server and the binary talk to the rest of the system through it
//! - **Event loop**: `LinkEvent` in, `GatewayEvent` out, in order
//! - **Teardown**: cancellation closes the link (and any backoff timer),
//!   ends an active session with one final flush, then drains the tasks

#![deny(unsafe_code)]

pub mod gateway;

pub use gateway::{Gateway, GatewayConfig};

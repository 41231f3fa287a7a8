//! # vigil-link
//!
//! Serial link management for the Vigil gateway.
//!
//! - [`PortOpener`] / [`LinkPort`]: the seam between the supervisor and the
//!   actual device, so tests can script link behavior
//! - [`SerialOpener`]: real implementation over the `serialport` crate
//!   (8N1, blocking reader thread feeding a bounded async channel)
//! - [`LinkManager`]: owns the open/read/reconnect lifecycle and emits
//!   [`LinkEvent`]s (state transitions and raw byte chunks) to the
//!   orchestrator

#![deny(unsafe_code)]

pub mod manager;
pub mod port;

pub use manager::{LinkConfig, LinkEvent, LinkManager};
pub use port::{LinkPort, PortOpener, SerialOpener};

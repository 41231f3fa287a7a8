//! # vigil-core
//!
//! Foundation types, errors, and utilities for the Vigil gateway.
//!
//! This crate provides the shared vocabulary the other Vigil crates depend on:
//!
//! - **Branded IDs**: `SessionId`, `DeviceId`, `ConnectionId` as newtypes for type safety
//! - **Readings**: `Reading` — one timestamped set of sensor values from the device
//! - **Events**: `GatewayEvent` wire enum (`reading` / `connection-status` / `session-update`)
//! - **Frame parsing**: `FrameParser` — line-delimited byte stream → validated readings
//! - **Errors**: `thiserror` hierarchy (`LinkError`, `FrameError`, `SessionError`, ...)
//! - **Retry**: `RetryPolicy` — exponential backoff with equal jitter, shared by the
//!   link manager and the telemetry forwarder

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod frame;
pub mod ids;
pub mod reading;
pub mod retry;

pub use errors::{FrameError, LinkError, SessionError};
pub use events::{ConnectionState, GatewayEvent, SessionStatus, SharedStatus, StatusSnapshot};
pub use frame::{FrameOutcome, FrameParser, FrameParserConfig};
pub use ids::{ConnectionId, DeviceId, SessionId};
pub use reading::Reading;
pub use retry::RetryPolicy;

//! Error hierarchy for the gateway core.
//!
//! Built on [`thiserror`]:
//!
//! - [`LinkError`]: serial link acquisition and read failures
//! - [`FrameError`]: malformed device output (non-fatal, logged)
//! - [`SessionError`]: session lifecycle failures
//!
//! Cloud delivery errors live in `vigil-cloud` (they carry `reqwest`
//! context); the runtime crate rolls everything up for callers.
//!
//! Propagation policy: hardware and network transients are recovered
//! locally with retry/backoff and never crash the process. Only session
//! start failures and explicit close requests surface to callers.

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// LinkError
// ─────────────────────────────────────────────────────────────────────────────

/// Failures of the physical serial link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The device path does not exist or is held by another process.
    /// Reported at open; the link manager retries on backoff.
    #[error("serial device unavailable: {path}: {reason}")]
    Unavailable {
        /// The device path that failed to open.
        path: String,
        /// Driver-level reason.
        reason: String,
    },

    /// A read failed after the link was established. The link transitions
    /// to `Faulted` and reconnects on backoff.
    #[error("serial read failed: {0}")]
    Read(#[from] std::io::Error),

    /// The port reached end-of-stream (device unplugged).
    #[error("serial device disconnected")]
    Disconnected,
}

// ─────────────────────────────────────────────────────────────────────────────
// FrameError
// ─────────────────────────────────────────────────────────────────────────────

/// A malformed line from the device. Never fatal: the offending line is
/// discarded and parsing resumes at the next terminator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The line did not split into the declared number of fields.
    #[error("expected {expected} fields, got {actual}")]
    FieldCount {
        /// Declared field count.
        expected: usize,
        /// Fields actually present.
        actual: usize,
    },

    /// A field failed to parse as a number.
    #[error("field {index} is not numeric: {text:?}")]
    NonNumeric {
        /// Zero-based field index.
        index: usize,
        /// The offending field text.
        text: String,
    },

    /// An unterminated line exceeded the maximum frame length and was
    /// dropped.
    #[error("unterminated frame exceeded {max_len} bytes, {dropped} bytes dropped")]
    Overflow {
        /// Configured maximum line length.
        max_len: usize,
        /// Bytes discarded.
        dropped: usize,
    },
}

impl FrameError {
    /// Whether this error is the overflow variant (`FrameOverflow` in the
    /// wire taxonomy, distinct from per-line parse failures).
    #[must_use]
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::Overflow { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionError
// ─────────────────────────────────────────────────────────────────────────────

/// Session lifecycle failures surfaced to callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start` was called while a session is already Active. The existing
    /// session is left unchanged.
    #[error("a session is already active")]
    AlreadyActive,

    /// `end` was called while no session is Active. Reported, not fatal.
    #[error("no active session")]
    NotActive,

    /// The cloud backend rejected the credentials, or re-authentication
    /// after token expiry failed. The session transitions to Ended.
    #[error("authentication failed: {reason}")]
    AuthenticationFailed {
        /// Backend-provided or transport-level reason.
        reason: String,
    },
}

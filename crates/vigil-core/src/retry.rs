//! Retry policy and backoff calculation.
//!
//! One policy object is invoked uniformly by the link manager (reconnect
//! scheduling) and the telemetry forwarder (cloud delivery retries). The
//! math is portable and sync; the callers sleep on the returned delay with
//! a cancellable timer.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff with equal jitter, unbounded attempts.
///
/// The deterministic ceiling for attempt `n` is
/// `min(max_delay, base_delay * 2^n)`; the actual delay is drawn uniformly
/// from the upper half of that range, so the first retry lands at roughly
/// the base delay while herds still spread out.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Base delay for the first retry in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit base and cap.
    #[must_use]
    pub const fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Deterministic delay ceiling for a zero-based attempt index.
    #[must_use]
    pub fn ceiling_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(1u64 << attempt.min(31))
            .min(self.max_delay_ms)
    }

    /// Jittered delay for a zero-based attempt index.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let random: f64 = rand::rng().random();
        Duration::from_millis(self.delay_ms_with_random(attempt, random))
    }

    /// Jittered delay with explicit randomness in `[0.0, 1.0)`.
    ///
    /// Exposed so tests can pin the draw.
    #[must_use]
    pub fn delay_ms_with_random(&self, attempt: u32, random: f64) -> u64 {
        let ceiling = self.ceiling_ms(attempt);
        let half = ceiling / 2;
        half + ((half as f64) * random).round() as u64
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

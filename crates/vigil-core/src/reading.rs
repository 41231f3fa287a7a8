//! The `Reading` type — one validated record from the device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::DeviceId;

/// A timestamped set of sensor values from the monitored device.
///
/// Produced by the frame parser, immutable once parsed. The value order
/// matches the field order on the serial line (the device declares what
/// each position means; the gateway does not interpret them).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// The device that produced this reading.
    pub device_id: DeviceId,
    /// When the gateway parsed the frame.
    pub timestamp: DateTime<Utc>,
    /// Ordered numeric sensor fields.
    pub values: Vec<f64>,
}

impl Reading {
    /// Create a reading stamped with the current time.
    #[must_use]
    pub fn now(device_id: DeviceId, values: Vec<f64>) -> Self {
        Self {
            device_id,
            timestamp: Utc::now(),
            values,
        }
    }
}

//! Error taxonomy for the poller.
//!
//! Busy and absent devices are not errors: they come back as
//! [`PollOutcome`](crate::query::PollOutcome) values and go through the
//! overlay path. Everything here is either contained at the per-device
//! boundary (tool failures, timeouts, unexpected output) or escapes to the
//! cycle loop (store I/O, serialization, configuration).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// The control tool could not be run, or exited with a failure status.
    #[error("query tool failed: `{command}`: {output}")]
    Tool { command: String, output: String },

    /// The control tool did not finish within the per-device deadline.
    #[error("query for {device} timed out after {secs:.1}s")]
    Timeout { device: String, secs: f64 },

    /// Tool output had neither the absent sentinel nor the expected status line.
    #[error("unexpected output from {device}: {output}")]
    UnexpectedFormat { device: String, output: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MonitorError {
    /// Whether the error belongs to one device and should degrade that
    /// device to "absent" instead of abandoning the cycle.
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::Tool { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

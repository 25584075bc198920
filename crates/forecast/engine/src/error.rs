//! Error types for forecast-engine crate.
//!
//! Defines invocation, parsing and round-level errors.

use forecast_types::{ApplicationName, MetricName};
use thiserror::Error;

/// Errors that can occur while producing forecasts.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The forecasting executable could not be started or awaited.
    #[error("failed to run forecasting executable for metric {metric}: {source}")]
    Launch {
        metric: MetricName,
        #[source]
        source: std::io::Error,
    },

    /// The forecasting executable exceeded its time limit.
    #[error("forecasting executable for metric {metric} timed out after {timeout_secs}s")]
    Timeout { metric: MetricName, timeout_secs: u64 },

    /// The executable ran but its output held no usable forecast.
    #[error("no usable forecast for metric {metric}: {reason}")]
    Parse {
        metric: MetricName,
        reason: String,
        stdout: String,
        stderr: String,
    },

    /// Configuration or observed data could not be refreshed.
    #[error("data snapshot unavailable for application {application}: {reason}")]
    SnapshotUnavailable {
        application: ApplicationName,
        reason: String,
    },

    /// A whole round could not be run.
    #[error("prediction round failed for application {application}: {reason}")]
    RoundFailed {
        application: ApplicationName,
        reason: String,
    },

    /// Schedule parameters are unusable.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

//! Per-metric result of one prediction round

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::interval::ConfidenceInterval;

/// Error metrics reported by the forecasting executable
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Mean absolute error
    pub mae: f64,
    /// Mean squared error
    pub mse: f64,
    /// Mean absolute percentage error
    pub mape: f64,
    /// Symmetric mean absolute percentage error
    pub smape: f64,
}

/// Outcome of forecasting one metric for one slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    /// Predicted value.
    pub value: f64,

    /// Confidence interval around the value.
    pub interval: ConfidenceInterval,

    /// Whether both a value and an interval were produced.
    pub valid: bool,

    /// Error metrics of the fitted model.
    pub errors: ErrorMetrics,

    /// Wall-clock time spent producing this outcome.
    pub elapsed: Duration,
}

impl PredictionOutcome {
    /// A usable forecast.
    pub fn valid(
        value: f64,
        interval: ConfidenceInterval,
        errors: ErrorMetrics,
        elapsed: Duration,
    ) -> Self {
        Self {
            value,
            interval,
            valid: true,
            errors,
            elapsed,
        }
    }

    /// A failed forecast. Carries placeholder numbers that are never published.
    pub fn invalid(elapsed: Duration) -> Self {
        Self {
            value: 0.0,
            interval: ConfidenceInterval::placeholder(),
            valid: false,
            errors: ErrorMetrics::default(),
            elapsed,
        }
    }
}

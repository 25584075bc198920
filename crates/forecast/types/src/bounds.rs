//! Declared value bounds of a metric

use serde::{Deserialize, Serialize};

/// Lower and upper bound of a metric, each independently optional
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl MetricBounds {
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self { lower, upper }
    }

    /// Bounds with neither end set
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn between(lower: f64, upper: f64) -> Self {
        Self::new(Some(lower), Some(upper))
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// True when both ends are set and the lower end exceeds the upper one
    pub fn is_inverted(&self) -> bool {
        matches!((self.lower, self.upper), (Some(lower), Some(upper)) if lower > upper)
    }
}

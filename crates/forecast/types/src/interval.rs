//! Confidence interval of a prediction
//!
//! The forecasting executable reports intervals as `lower,upper`. The type
//! keeps its ends ordered so `lower() <= upper()` always holds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{TypesError, TypesResult};

/// Half-width of the placeholder interval carried by invalid outcomes
const PLACEHOLDER_HALF_WIDTH: f64 = 1e25;

/// Ordered `(lower, upper)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    lower: f64,
    upper: f64,
}

impl ConfidenceInterval {
    /// Build an interval, swapping the ends if they arrive reversed
    pub fn new(a: f64, b: f64) -> Self {
        if a <= b {
            Self { lower: a, upper: b }
        } else {
            Self { lower: b, upper: a }
        }
    }

    /// Interval collapsed onto a single point
    pub fn point(value: f64) -> Self {
        Self {
            lower: value,
            upper: value,
        }
    }

    /// Wide interval used when no forecast was produced
    pub fn placeholder() -> Self {
        Self::new(-PLACEHOLDER_HALF_WIDTH, PLACEHOLDER_HALF_WIDTH)
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    pub fn as_pair(&self) -> [f64; 2] {
        [self.lower, self.upper]
    }
}

impl fmt::Display for ConfidenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.lower, self.upper)
    }
}

impl FromStr for ConfidenceInterval {
    type Err = TypesError;

    fn from_str(s: &str) -> TypesResult<Self> {
        let mut parts = s.split(',');
        let (Some(lower), Some(upper), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(TypesError::InvalidInterval(s.to_string()));
        };

        let lower = parse_finite(lower).map_err(|_| TypesError::InvalidInterval(s.to_string()))?;
        let upper = parse_finite(upper).map_err(|_| TypesError::InvalidInterval(s.to_string()))?;

        Ok(Self::new(lower, upper))
    }
}

/// Parse a finite floating point number, rejecting NaN and infinities
pub fn parse_finite(raw: &str) -> TypesResult<f64> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| TypesError::InvalidNumber(raw.to_string()))?;

    if value.is_finite() {
        Ok(value)
    } else {
        Err(TypesError::InvalidNumber(raw.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interval() {
        let interval: ConfidenceInterval = "30,55".parse().unwrap();
        assert_eq!(interval.lower(), 30.0);
        assert_eq!(interval.upper(), 55.0);
        assert_eq!(interval.to_string(), "30,55");
    }

    #[test]
    fn test_reversed_ends_are_ordered() {
        let interval: ConfidenceInterval = "12.5,-3".parse().unwrap();
        assert_eq!(interval.as_pair(), [-3.0, 12.5]);
    }

    #[test]
    fn test_malformed_intervals_rejected() {
        for raw in ["", "1", "1,2,3", "a,2", "1,NaN", "inf,2"] {
            assert!(
                raw.parse::<ConfidenceInterval>().is_err(),
                "{raw:?} should not parse"
            );
        }
    }

    #[test]
    fn test_point_display() {
        assert_eq!(ConfidenceInterval::point(0.0).to_string(), "0,0");
    }
}

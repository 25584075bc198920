//! Bus message bodies
//!
//! Inbound control messages are deserialized leniently where the producers
//! are known to send numbers as strings. Any missing required field fails
//! deserialization, which the dispatcher treats as a malformed message.

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::ids::{ApplicationName, MetricName};
use crate::interval::ConfidenceInterval;

/// Severity level stamped on every published forecast
pub const FORECAST_LEVEL: u8 = 3;

/// Coverage probability of the published confidence interval
pub const FORECAST_PROBABILITY: f64 = 0.95;

/// Version assumed when a start message carries none
pub const DEFAULT_START_VERSION: u64 = 1;

/// Largest epoch origin accepted, in seconds either side of 1970
pub const MAX_EPOCH_SECS: f64 = 1e12;

/// Metric bounds definition (`monitoring.metric_list`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricListMessage {
    pub name: ApplicationName,
    pub version: u64,
    pub metric_list: Vec<MetricBoundDefinition>,
}

/// Bounds of a single metric inside a [`MetricListMessage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricBoundDefinition {
    pub name: MetricName,
    #[serde(default, deserialize_with = "optional_number")]
    pub lower_bound: Option<f64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub upper_bound: Option<f64>,
}

/// Request to start forecasting (`forecasting.start_forecasting.<method>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartForecastingMessage {
    pub name: ApplicationName,
    #[serde(default)]
    pub version: Option<u64>,
    pub metrics: Vec<MetricName>,
    #[serde(deserialize_with = "required_number")]
    pub epoch_start: f64,
    #[serde(deserialize_with = "required_number")]
    pub prediction_horizon: f64,
}

impl StartForecastingMessage {
    pub fn version_or_default(&self) -> u64 {
        self.version.unwrap_or(DEFAULT_START_VERSION)
    }

    /// Epoch origin in whole seconds, `None` unless finite and within
    /// [`MAX_EPOCH_SECS`] of 1970
    pub fn epoch_start_secs(&self) -> Option<i64> {
        let epoch = self.epoch_start.floor();
        (epoch.is_finite() && epoch.abs() <= MAX_EPOCH_SECS).then_some(epoch as i64)
    }

    /// Horizon in whole seconds, `None` unless it truncates into
    /// `1..=u32::MAX`
    pub fn horizon_secs(&self) -> Option<u64> {
        let horizon = self.prediction_horizon.trunc();
        (1.0..=u32::MAX as f64)
            .contains(&horizon)
            .then_some(horizon as u64)
    }
}

/// Request to stop forecasting some or all metrics
/// (`forecasting.stop_forecasting.<method>`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopForecastingMessage {
    pub name: ApplicationName,
    pub metrics: Vec<MetricName>,
}

/// Forecast published for one (application, metric, slot)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMessage {
    #[serde(rename = "metricValue")]
    pub metric_value: f64,
    pub level: u8,
    /// Publication time, epoch seconds
    pub timestamp: i64,
    pub probability: f64,
    pub confidence_interval: [f64; 2],
    /// Slot the forecast targets, epoch seconds
    #[serde(rename = "predictionTime")]
    pub prediction_time: i64,
}

impl ForecastMessage {
    pub fn new(value: f64, interval: ConfidenceInterval, slot: i64, published_at: i64) -> Self {
        Self {
            metric_value: value,
            level: FORECAST_LEVEL,
            timestamp: published_at,
            probability: FORECAST_PROBABILITY,
            confidence_interval: interval.as_pair(),
            prediction_time: slot,
        }
    }
}

/// Periodic liveness signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessMessage {
    pub isalive: bool,
}

impl LivenessMessage {
    pub fn alive() -> Self {
        Self { isalive: true }
    }
}

/// Accept a JSON number, a numeric string or null. Non-finite values mean
/// "no bound".
fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = match value {
        serde_json::Value::Null => None,
        other => Some(number_from_value(&other).map_err(de::Error::custom)?),
    };
    Ok(number.filter(|n| n.is_finite()))
}

fn required_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = number_from_value(&value).map_err(de::Error::custom)?;
    if number.is_finite() {
        Ok(number)
    } else {
        Err(de::Error::custom(format!("expected a finite number, got {value}")))
    }
}

fn number_from_value(value: &serde_json::Value) -> Result<f64, String> {
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("number out of range: {n}")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("expected a number, got {s:?}")),
        other => Err(format!("expected a number, got {other}")),
    }
}

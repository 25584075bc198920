//! Bus address layout
//!
//! Every address lives under a general prefix and is grouped by purpose:
//! monitoring data, forecasting control, component state, and the
//! per-metric destinations forecasts are published to.

use serde::{Deserialize, Serialize};

use crate::ids::MetricName;

pub const DEFAULT_TOPIC_PREFIX: &str = "eu.nebulouscloud.";
pub const DEFAULT_METHOD: &str = "exponentialsmoothing";

pub const MONITORING_DATA_PREFIX: &str = "monitoring.";
pub const FORECASTING_CONTROL_PREFIX: &str = "forecasting.";
pub const COMPONENT_STATE_PREFIX: &str = "state.";
pub const PREDICTION_PREFIX: &str = "preliminary_predicted.";
pub const TRANSPORT_SCHEME: &str = "topic://";

/// Address layout for one forecasting method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicLayout {
    /// General prefix shared by every address.
    pub prefix: String,

    /// Forecasting method this process implements.
    pub method: String,
}

impl Default for TopicLayout {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX, DEFAULT_METHOD)
    }
}

impl TopicLayout {
    pub fn new(prefix: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            method: method.into(),
        }
    }

    pub fn metric_list(&self) -> String {
        format!("{}{}metric_list", self.prefix, MONITORING_DATA_PREFIX)
    }

    pub fn start_forecasting(&self) -> String {
        format!(
            "{}{}start_forecasting.{}",
            self.prefix, FORECASTING_CONTROL_PREFIX, self.method
        )
    }

    pub fn stop_forecasting(&self) -> String {
        format!(
            "{}{}stop_forecasting.{}",
            self.prefix, FORECASTING_CONTROL_PREFIX, self.method
        )
    }

    pub fn test_mode(&self) -> String {
        format!("{}{}test.{}", self.prefix, FORECASTING_CONTROL_PREFIX, self.method)
    }

    pub fn liveness(&self) -> String {
        format!("{}{}{}.isalive", self.prefix, COMPONENT_STATE_PREFIX, self.method)
    }

    /// Destination a metric's forecasts are published to
    pub fn prediction_destination(&self, metric: &MetricName) -> String {
        format!(
            "{}{}{}.{}",
            self.prefix, PREDICTION_PREFIX, self.method, metric
        )
    }

    /// Strip the transport scheme and the general prefix from an inbound address
    pub fn relative<'a>(&self, address: &'a str) -> &'a str {
        let address = address.strip_prefix(TRANSPORT_SCHEME).unwrap_or(address);
        address.strip_prefix(self.prefix.as_str()).unwrap_or(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addresses() {
        let topics = TopicLayout::default();
        assert_eq!(
            topics.start_forecasting(),
            "eu.nebulouscloud.forecasting.start_forecasting.exponentialsmoothing"
        );
        assert_eq!(
            topics.liveness(),
            "eu.nebulouscloud.state.exponentialsmoothing.isalive"
        );
        assert_eq!(
            topics.prediction_destination(&MetricName::new("cpu")),
            "eu.nebulouscloud.preliminary_predicted.exponentialsmoothing.cpu"
        );
    }

    #[test]
    fn test_relative_address() {
        let topics = TopicLayout::default();
        assert_eq!(
            topics.relative("topic://eu.nebulouscloud.monitoring.metric_list"),
            "monitoring.metric_list"
        );
        assert_eq!(topics.relative("other.topic"), "other.topic");
    }
}

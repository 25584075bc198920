//! Forecast Types - shared vocabulary of the forecasting service
//!
//! This crate holds the data that flows between the scheduling engine, the
//! application registry and the bus:
//!
//! - **Names**: [`ApplicationName`] and [`MetricName`] newtypes
//! - **Bounds**: optional per-metric [`MetricBounds`]
//! - **Outcomes**: [`ConfidenceInterval`], [`PredictionOutcome`], [`ErrorMetrics`]
//! - **Messages**: inbound control messages and the outbound [`ForecastMessage`]
//! - **Topics**: the [`TopicLayout`] used to build bus addresses

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod bounds;
pub mod error;
pub mod ids;
pub mod interval;
pub mod messages;
pub mod outcome;
pub mod topics;

// Re-exports
pub use bounds::MetricBounds;
pub use error::{TypesError, TypesResult};
pub use ids::{ApplicationName, MetricName};
pub use interval::{parse_finite, ConfidenceInterval};
pub use messages::{
    ForecastMessage, LivenessMessage, MetricBoundDefinition, MetricListMessage,
    StartForecastingMessage, StopForecastingMessage, DEFAULT_START_VERSION, FORECAST_LEVEL,
    FORECAST_PROBABILITY, MAX_EPOCH_SECS,
};
pub use outcome::{ErrorMetrics, PredictionOutcome};
pub use topics::TopicLayout;

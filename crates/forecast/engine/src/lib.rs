//! # Forecast Engine - Scheduling and Prediction Rounds
//!
//! This crate turns an application's metric set into a steady stream of
//! sanitized forecasts.
//!
//! ## Key Components
//!
//! - [`sanitize()`]: clamps a prediction and its interval to metric bounds
//! - [`ForecastInvoker`]: narrow seam around the forecasting executable
//! - [`RoundExecutor`]: fans one invocation out per metric and joins them
//! - [`ScheduleState`]: epoch-aligned slot arithmetic with catch-up
//! - [`ForecastScheduler`]: the per-application round-after-round loop
//!
//! ## Slot Alignment
//!
//! Forecasts target slots `epoch_start + k * horizon`. Before each batch the
//! scheduler picks the first slot it can still prepare given its worst
//! observed processing time, skipping slots it would miss rather than
//! publishing late forecasts.
//!
//! ## Integration Points
//!
//! The scheduler talks to the outside world through three traits:
//!
//! - [`ForecastTarget`]: live view of an application's record (registry)
//! - [`SnapshotProvider`]: per-cycle configuration and data refresh
//! - [`PredictionSink`]: non-blocking hand-off to publication

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod invoker;
pub mod sanitize;
pub mod schedule;
pub mod scheduler;
pub mod snapshot;

// Re-export main types
pub use config::{EngineConfig, ExecutableConfig};
pub use error::{EngineError, EngineResult};
pub use events::ForecastEvent;
pub use executor::{MetricJob, RoundExecutor, RoundResults};
pub use invoker::{
    forecast_metric, parse_forecast_output, ExternalForecaster, ForecastInvoker,
    InvocationRequest, RawForecast,
};
pub use sanitize::sanitize;
pub use schedule::{next_due_slot, AnchoredClock, Clock, ScheduleState, SlotPlan, SystemClock};
pub use scheduler::{
    ApplicationPlan, ForecastScheduler, ForecastTarget, PredictionSink, SchedulerContext,
};
pub use snapshot::{DirectorySnapshot, RoundSettings, SnapshotProvider};

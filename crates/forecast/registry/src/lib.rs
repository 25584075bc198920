//! Forecast Registry - Application records and lifecycle
//!
//! One [`ApplicationRecord`] per monitored application, created by the first
//! control message that names it. The [`ApplicationRegistry`] applies the
//! three control operations to those records:
//!
//! - **define-metric-bounds**: per-metric lower/upper bounds
//! - **start-forecasting**: metric set, schedule, and at most one scheduler loop
//! - **stop-forecasting**: removes metrics, deactivating when none remain
//!
//! Control messages carry a version; a start request that repeats the active
//! metric set with an equal or lower version is a no-op.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod record;
pub mod registry;

// Re-exports
pub use error::{RegistryError, RegistryResult};
pub use record::{ApplicationRecord, ApplicationState};
pub use registry::{
    ApplicationRegistry, ApplicationStatus, BoundsUpdate, MetricStatus, RoundSummary,
    StartOutcome, StopOutcome,
};

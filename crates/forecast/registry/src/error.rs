//! Registry error types

use forecast_types::ApplicationName;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Application not found: {0}")]
    UnknownApplication(ApplicationName),

    #[error("Invalid prediction horizon: {0}")]
    InvalidHorizon(f64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for registry operations
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

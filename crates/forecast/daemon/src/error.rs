//! Error types for the forecast daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use forecast_publish::PublishError;
use forecast_registry::RegistryError;
use serde_json::json;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Bus error: {0}")]
    Bus(#[from] PublishError),

    #[error("Properties error: {0}")]
    Properties(String),
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors raised while handling one inbound bus message
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Malformed message on {address}: {reason}")]
    Malformed { address: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Could not record component state: {0}")]
    Io(#[from] std::io::Error),
}

/// API errors returned by HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::Malformed { .. } => ApiError::BadRequest(error.to_string()),
            DispatchError::Registry(RegistryError::UnknownApplication(name)) => {
                ApiError::NotFound(format!("application {name}"))
            }
            DispatchError::Registry(e) => ApiError::BadRequest(e.to_string()),
            DispatchError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

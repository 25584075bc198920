//! Error types for value parsing

use thiserror::Error;

/// Errors raised while parsing forecast values
#[derive(Debug, Error, PartialEq)]
pub enum TypesError {
    #[error("Invalid confidence interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

/// Result type for value parsing
pub type TypesResult<T> = Result<T, TypesError>;

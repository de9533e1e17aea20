//! Error types shared across the workspace.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised while parsing shared value types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommonError {
    #[error("Invalid timestamp key: {0}")]
    InvalidTimestampKey(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Unknown satellite sector: {0}")]
    UnknownSector(String),

    #[error("Unknown composite product: {0}")]
    UnknownProduct(String),

    #[error("Unknown temperature style: {0}")]
    UnknownStyle(String),
}

//! Error types for cost loading.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while querying the cost backends or reading exports.
#[derive(Debug, Error)]
pub enum CostError {
    /// HTTP request failed (connection, TLS, transport timeout)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status
    #[error("Cost backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The cost query did not resolve in time
    #[error("Cost query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
}

/// Error classes as seen by the cost view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkTimeout,
    NetworkError,
    AuthMissing,
    EmptyResult,
}

impl CostError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CostError::Timeout(_) => ErrorKind::NetworkTimeout,
            CostError::Http(e) if e.is_timeout() => ErrorKind::NetworkTimeout,
            _ => ErrorKind::NetworkError,
        }
    }
}

pub type Result<T> = std::result::Result<T, CostError>;

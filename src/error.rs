//! Error types for the capture engine

use thiserror::Error;

/// Failure of a single page-driver primitive.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Nothing matched the query within its time box
    #[error("Element not found: {0}")]
    NotFound(String),

    /// Operation did not finish within its time box
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The query cannot be expressed against this document
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Browser, protocol or element-state failure
    #[error("Browser error: {0}")]
    Browser(String),
}

impl DriverError {
    pub fn browser(err: impl std::fmt::Display) -> Self {
        DriverError::Browser(err.to_string())
    }

    /// Whether the page itself is gone (closed tab, crashed browser).
    pub fn is_fatal(&self) -> bool {
        match self {
            DriverError::Browser(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("connection closed")
                    || msg.contains("target closed")
                    || msg.contains("browser closed")
                    || msg.contains("no such target")
            }
            _ => false,
        }
    }
}

/// Failure talking to the decision oracle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Oracle request failed: {0}")]
    Transport(String),

    #[error("Oracle returned an error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Oracle returned no content")]
    EmptyResponse,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} is not set")]
    Missing { key: &'static str },

    #[error("{key} must be a positive integer, got '{value}'")]
    NotPositive { key: &'static str, value: String },
}

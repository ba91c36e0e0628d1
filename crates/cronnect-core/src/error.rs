//! Crate-wide error type

use crate::broker::BrokerError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cronnect
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid schedule: {0}")]
    Schedule(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Broker(_) => "broker",
            Error::Serialization(_) => "serialization",
            Error::Schedule(_) => "schedule",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Http(_) => "http",
            Error::Other(_) => "other",
        }
    }
}

//! Broker layer: the shared Redis instance the pipeline coordinates through
//!
//! Three concerns live here:
//! - `connection`: a thin typed adapter over the list / sorted-set / key
//!   primitives the queue service, scheduler and retry dispatcher consume
//! - `rate_limit`: the per-user sliding-window limiter gating scheduling
//! - `config`: connection settings
//!
//! The adapter carries no domain logic; every error surfaces to the caller.

pub mod config;
pub mod connection;
pub mod rate_limit;

pub use config::BrokerConfig;
pub use connection::{BrokerConnection, RedisPool};
pub use rate_limit::{RateLimitConfig, RateLimitDecision, RateLimitStatus, RateLimiter};

/// Broker result type alias
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Broker-specific error types
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker operation failed: {0}")]
    Operation(String),
}

impl From<redis::RedisError> for BrokerError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            BrokerError::Connection(err.to_string())
        } else {
            BrokerError::Operation(err.to_string())
        }
    }
}

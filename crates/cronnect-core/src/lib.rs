//! cronnect-core: the execution pipeline of a distributed cron-like HTTP pinger
//!
//! Users register named HTTP jobs with a cron schedule; the system fires each
//! job on its schedule, observes the response, records every attempt, and
//! retries transient failures with bounded backoff.
//!
//! The pipeline:
//! - the [`jobs::Scheduler`] fires jobs on cron ticks, gated by the
//!   per-user sliding-window [`broker::RateLimiter`]
//! - the [`jobs::QueueService`] publishes payloads with per-job dedup and
//!   turns worker results into terminal states, delayed retries, or dead
//!   letters
//! - [`jobs::Worker`]s pull payloads, perform the HTTP request, and
//!   classify the outcome
//! - the [`jobs::RetryDispatcher`] moves due retries back to the ready list
//!
//! Shared state lives in the broker (Redis lists, sorted sets, TTL keys) and
//! the relational store behind the [`repository`] traits. Delivery is
//! at-least-once with a 10-minute per-job dedup window.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod repository;

// Re-export commonly used types
pub use broker::{BrokerConfig, BrokerConnection, RateLimitConfig, RateLimiter, RedisPool};
pub use config::Config;
pub use error::{Error, Result};
pub use jobs::{
    DeadLetter, DeadLetterLog, JobProcessor, QueueService, RetryDispatcher, Scheduler, Worker,
    WorkerPool,
};
pub use models::{ExecutionStatus, Job, JobExecution, JobPayload, JobResult, JobStatus, User};
pub use repository::{
    ExecutionRepositoryTrait, InMemoryExecutionRepository, InMemoryJobRepository,
    JobRepositoryTrait, PgExecutionRepository, PgJobRepository,
};

/// Current version of cronnect
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

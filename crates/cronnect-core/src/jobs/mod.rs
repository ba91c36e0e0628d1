//! The execution pipeline
//!
//! Four cooperating actors share state through the broker:
//! - `scheduler`: parses cron expressions and fires jobs on their schedule,
//!   gated by the rate limiter
//! - `queue`: publishes payloads with per-job deduplication, hands results
//!   into the retry / dead-letter machinery
//! - `worker`: pulls payloads, performs the HTTP request, classifies the
//!   outcome
//! - `retry`: moves delayed payloads back to the ready list once due
//!
//! Delivery is at-least-once: duplicates can occur if a worker completes the
//! request but dies before recording the result. Per-job ordering comes from
//! the pending-marker dedup, not from the queue.

pub mod dead_letter;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod worker;

pub use dead_letter::{DeadLetter, DeadLetterLog};
pub use queue::{QueueService, DEAD_QUEUE, JOB_QUEUE, RESULT_QUEUE, RETRY_QUEUE};
pub use retry::RetryDispatcher;
pub use scheduler::Scheduler;
pub use worker::{Worker, WorkerPool};

use async_trait::async_trait;

use crate::models::{JobPayload, JobResult};

/// Processes one payload and reports the outcome
///
/// Implementations classify, they never retry; retry decisions belong to the
/// queue service.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, payload: &JobPayload) -> JobResult;
}

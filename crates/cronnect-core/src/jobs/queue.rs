//! Queue service: publish, consume, and result handling over the broker

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::RedisPool;
use crate::jobs::dead_letter::DeadLetter;
use crate::jobs::JobProcessor;
use crate::models::{ExecutionStatus, Job, JobExecution, JobPayload, JobResult};
use crate::repository::ExecutionRepositoryTrait;
use crate::{Error, Result};

/// Ready list workers consume from
pub const JOB_QUEUE: &str = "cronnect:jobs";

/// Reserved for future result fan-out; nothing writes it today
pub const RESULT_QUEUE: &str = "cronnect:results";

/// Delayed sorted set, score = due epoch seconds
pub const RETRY_QUEUE: &str = "cronnect:retry";

/// Terminal failures with their envelope
pub const DEAD_QUEUE: &str = "cronnect:dead";

/// Attempts after the first before a payload is dead-lettered
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Dedup window: a stuck attempt is considered abandoned after this long
const PENDING_TTL: Duration = Duration::from_secs(600);

/// BRPOP timeout; doubles as the shutdown poll interval for workers
const POP_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a broker error in the consume loop
const CONSUME_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Publishes jobs, feeds workers, and turns results into terminal states,
/// retries, or dead letters.
#[derive(Clone)]
pub struct QueueService {
    pool: RedisPool,
    executions: Arc<dyn ExecutionRepositoryTrait>,
    ready_list: String,
    retry_set: String,
    dead_list: String,
}

impl QueueService {
    /// Create a queue service on the standard `cronnect:*` keys
    pub fn new(pool: RedisPool, executions: Arc<dyn ExecutionRepositoryTrait>) -> Self {
        Self::with_queue_names(pool, executions, JOB_QUEUE, RETRY_QUEUE, DEAD_QUEUE)
    }

    /// Create a queue service on a custom key namespace (isolated deployments
    /// and tests)
    pub fn with_queue_names(
        pool: RedisPool,
        executions: Arc<dyn ExecutionRepositoryTrait>,
        ready_list: impl Into<String>,
        retry_set: impl Into<String>,
        dead_list: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            executions,
            ready_list: ready_list.into(),
            retry_set: retry_set.into(),
            dead_list: dead_list.into(),
        }
    }

    /// Dedup marker key for a job
    pub fn pending_key(job_id: Uuid) -> String {
        format!("pending:{}", job_id)
    }

    /// Quadratic backoff: 1, 4, 9 minutes for retry attempts 1-3
    pub fn retry_delay(retry_count: u32) -> chrono::Duration {
        chrono::Duration::minutes((retry_count as i64) * (retry_count as i64))
    }

    /// The delayed sorted set this service requeues into
    pub fn retry_set(&self) -> &str {
        &self.retry_set
    }

    /// Publish a scheduled attempt for a job
    ///
    /// At most one queued-or-in-flight attempt exists per job at any moment,
    /// bounded by the marker TTL. This is at-most-one-within-window, not
    /// absolute mutual exclusion.
    pub async fn publish(&self, job: &Job) -> Result<()> {
        let mut conn = self.pool.get();
        let pending_key = Self::pending_key(job.id);

        match conn.exists(&pending_key).await {
            Ok(true) => {
                info!(job = %job.name, "job already has a pending execution, skipping");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                // Publish anyway; a duplicate is preferable to a missed fire
                warn!(job = %job.name, error = %e, "failed to check pending marker");
            }
        }

        let mut execution = JobExecution::queued(job.id);
        self.executions.create(&execution).await?;

        let payload = JobPayload::for_job(job, execution.id, DEFAULT_MAX_RETRIES);
        let payload_json = serde_json::to_string(&payload)?;

        let enqueued = async {
            conn.set_with_ttl(&pending_key, &execution.id.to_string(), PENDING_TTL)
                .await?;
            conn.push_head(&self.ready_list, &payload_json).await
        }
        .await;

        if let Err(e) = enqueued {
            if let Err(del_err) = conn.del(&pending_key).await {
                warn!(job = %job.name, error = %del_err, "failed to clean up pending marker");
            }
            execution.apply_outcome(ExecutionStatus::Failed, None, Utc::now());
            if let Err(save_err) = self.executions.save(&execution).await {
                error!(job = %job.name, error = %save_err, "failed to mark execution failed");
            }
            return Err(e.into());
        }

        info!(job = %job.name, execution = %execution.id, "published job to ready queue");
        Ok(())
    }

    /// Consume payloads forever on behalf of a worker
    pub async fn consume(&self, worker_id: &str, processor: &dyn JobProcessor) {
        info!(worker = worker_id, "consuming jobs from ready queue");

        loop {
            self.poll_once(worker_id, processor).await;
        }
    }

    /// One consume iteration: blocking-pop, process, handle the result.
    /// Returns true when a payload was processed. Errors are handled here so
    /// worker loops never die.
    pub async fn poll_once(&self, worker_id: &str, processor: &dyn JobProcessor) -> bool {
        let mut conn = self.pool.get();

        let raw = match conn.pop_tail_blocking(&self.ready_list, POP_TIMEOUT).await {
            Ok(Some((_, raw))) => raw,
            Ok(None) => return false,
            Err(e) => {
                error!(worker = worker_id, error = %e, "error consuming job");
                tokio::time::sleep(CONSUME_ERROR_BACKOFF).await;
                return false;
            }
        };

        // The pop already removed the payload; a malformed one can only be
        // logged and dropped.
        let payload: JobPayload = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                error!(worker = worker_id, error = %e, "dropping malformed job payload");
                return false;
            }
        };

        info!(
            worker = worker_id,
            job = %payload.name,
            execution = %payload.execution_id,
            "processing job"
        );

        let result = processor.process(&payload).await;

        if let Err(e) = self.handle_result(&payload, &result).await {
            error!(worker = worker_id, error = %e, "failed to handle job result");
        }

        true
    }

    /// Record an attempt outcome and route the payload onward
    pub async fn handle_result(&self, payload: &JobPayload, result: &JobResult) -> Result<()> {
        let mut execution = self
            .executions
            .find_by_id(result.execution_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("execution {}", result.execution_id)))?;

        let pending_key = Self::pending_key(payload.job_id);
        let mut conn = self.pool.get();

        if result.status == ExecutionStatus::Failed && payload.can_retry() {
            // The next attempt gets its own row; this one closes as "retry".
            let next_execution = JobExecution::queued(payload.job_id);
            let mut retry = payload.clone();
            retry.retry_count += 1;
            retry.execution_id = next_execution.id;

            self.executions.create(&next_execution).await?;

            match self.requeue_for_retry(&retry).await {
                Ok(()) => {
                    execution.apply_outcome(
                        ExecutionStatus::Retry,
                        result.response_code,
                        result.completed_at,
                    );

                    // Keep the dedup marker pointing at the live attempt
                    if let Err(e) = conn
                        .set_with_ttl(&pending_key, &next_execution.id.to_string(), PENDING_TTL)
                        .await
                    {
                        warn!(job = %payload.name, error = %e, "failed to refresh pending marker");
                    }

                    info!(
                        job = %payload.name,
                        attempt = retry.retry_count,
                        max_retries = retry.max_retries,
                        "job queued for retry"
                    );
                }
                Err(e) => {
                    error!(job = %payload.name, error = %e, "failed to requeue job for retry");

                    self.move_to_dead(
                        &retry,
                        result.error_message.as_deref().unwrap_or("retry enqueue failed"),
                    )
                    .await;

                    if let Err(del_err) = conn.del(&pending_key).await {
                        warn!(job = %payload.name, error = %del_err, "failed to delete pending marker");
                    }

                    execution.apply_outcome(
                        ExecutionStatus::Failed,
                        result.response_code,
                        result.completed_at,
                    );

                    let mut next_execution = next_execution;
                    next_execution.apply_outcome(ExecutionStatus::Failed, None, Utc::now());
                    if let Err(save_err) = self.executions.save(&next_execution).await {
                        warn!(job = %payload.name, error = %save_err, "failed to close retry execution");
                    }
                }
            }
        } else {
            if let Err(e) = conn.del(&pending_key).await {
                warn!(job = %payload.name, error = %e, "failed to delete pending marker");
            }

            if result.status == ExecutionStatus::Failed {
                self.move_to_dead(payload, result.error_message.as_deref().unwrap_or(""))
                    .await;
                info!(
                    job = %payload.name,
                    attempts = payload.retry_count,
                    "job moved to dead letter queue"
                );
            }

            execution.apply_outcome(result.status, result.response_code, result.completed_at);
        }

        self.executions.save(&execution).await
    }

    /// Schedule a failed payload for a delayed re-attempt
    async fn requeue_for_retry(&self, payload: &JobPayload) -> Result<()> {
        let due_at = Utc::now() + Self::retry_delay(payload.retry_count);
        let payload_json = serde_json::to_string(payload)?;

        let mut conn = self.pool.get();
        conn.zadd(&self.retry_set, due_at.timestamp() as f64, &payload_json)
            .await?;

        Ok(())
    }

    /// Push a dead-letter envelope; best-effort, errors are logged
    async fn move_to_dead(&self, payload: &JobPayload, error_message: &str) {
        let dead = DeadLetter::new(payload.clone(), error_message);

        let envelope = match serde_json::to_string(&dead) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(job = %payload.name, error = %e, "failed to encode dead letter");
                return;
            }
        };

        let mut conn = self.pool.get();
        if let Err(e) = conn.push_head(&self.dead_list, &envelope).await {
            error!(job = %payload.name, error = %e, "failed to push dead letter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerConfig;
    use crate::repository::InMemoryExecutionRepository;

    #[test]
    fn test_retry_delay_is_quadratic() {
        assert_eq!(QueueService::retry_delay(1), chrono::Duration::minutes(1));
        assert_eq!(QueueService::retry_delay(2), chrono::Duration::minutes(4));
        assert_eq!(QueueService::retry_delay(3), chrono::Duration::minutes(9));
    }

    #[test]
    fn test_pending_key_format() {
        let id = Uuid::new_v4();
        assert_eq!(QueueService::pending_key(id), format!("pending:{}", id));
    }

    // Broker-backed tests run on per-test key namespaces and pass trivially
    // when no local Redis is reachable.
    struct TestQueues {
        service: QueueService,
        executions: Arc<InMemoryExecutionRepository>,
        pool: RedisPool,
        ready: String,
        retry: String,
        dead: String,
    }

    async fn test_service() -> Option<TestQueues> {
        let pool = RedisPool::connect(BrokerConfig::default()).await.ok()?;
        let executions = Arc::new(InMemoryExecutionRepository::new());

        let ns = Uuid::new_v4();
        let ready = format!("cronnect:test:{}:jobs", ns);
        let retry = format!("cronnect:test:{}:retry", ns);
        let dead = format!("cronnect:test:{}:dead", ns);

        let service = QueueService::with_queue_names(
            pool.clone(),
            executions.clone(),
            ready.clone(),
            retry.clone(),
            dead.clone(),
        );

        Some(TestQueues {
            service,
            executions,
            pool,
            ready,
            retry,
            dead,
        })
    }

    fn test_job() -> Job {
        Job::new(
            format!("user-{}", Uuid::new_v4()),
            format!("ping-{}", Uuid::new_v4()),
            "https://example.com/health",
            "* * * * *",
        )
    }

    #[tokio::test]
    async fn test_publish_dedups_then_enqueues() {
        if let Some(t) = test_service().await {
            let job = test_job();
            let mut conn = t.pool.get();

            // Pre-seeded marker means an attempt is already in flight:
            // five publishes are all no-ops
            conn.set_with_ttl(
                &QueueService::pending_key(job.id),
                "xyz",
                Duration::from_secs(60),
            )
            .await
            .unwrap();

            for _ in 0..5 {
                t.service.publish(&job).await.unwrap();
            }

            assert_eq!(t.executions.len().await, 0);
            assert_eq!(conn.list_len(&t.ready).await.unwrap(), 0);

            // Marker gone: publish goes through
            conn.del(&QueueService::pending_key(job.id)).await.unwrap();
            t.service.publish(&job).await.unwrap();

            assert_eq!(t.executions.len().await, 1);
            assert!(conn.exists(&QueueService::pending_key(job.id)).await.unwrap());

            let popped = conn
                .pop_tail_blocking(&t.ready, Duration::from_secs(1))
                .await
                .unwrap()
                .expect("payload should be on the ready list");
            let payload: JobPayload = serde_json::from_str(&popped.1).unwrap();
            assert_eq!(payload.job_id, job.id);
            assert_eq!(payload.retry_count, 0);
            assert_eq!(payload.max_retries, DEFAULT_MAX_RETRIES);

            conn.del(&QueueService::pending_key(job.id)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_failed_result_schedules_retry_with_backoff() {
        if let Some(t) = test_service().await {
            let job = test_job();
            let execution = JobExecution::queued(job.id);
            t.executions.create(&execution).await.unwrap();

            let payload = JobPayload::for_job(&job, execution.id, DEFAULT_MAX_RETRIES);
            let result = JobResult::failure(execution.id, Some(500), "HTTP status 500: oops");

            t.service.handle_result(&payload, &result).await.unwrap();

            // First attempt closes as retry, without a finish time
            let stored = t.executions.find_by_id(execution.id).await.unwrap().unwrap();
            assert_eq!(stored.status, ExecutionStatus::Retry);
            assert!(stored.finished_at.is_none());
            assert_eq!(stored.response_code, Some(500));

            // A fresh row exists for the next attempt
            assert_eq!(t.executions.len().await, 2);

            // Delayed entry is due one minute out
            let mut conn = t.pool.get();
            let horizon = (Utc::now() + chrono::Duration::seconds(90)).timestamp() as f64;
            let due = conn
                .zrange_by_score_with_scores(&t.retry, 0.0, horizon)
                .await
                .unwrap();
            assert_eq!(due.len(), 1);

            let requeued: JobPayload = serde_json::from_str(&due[0].0).unwrap();
            assert_eq!(requeued.retry_count, 1);
            assert_eq!(requeued.job_id, job.id);
            assert_ne!(requeued.execution_id, execution.id);

            let expected = (Utc::now() + chrono::Duration::seconds(60)).timestamp() as f64;
            assert!((due[0].1 - expected).abs() <= 2.0);

            // Marker survives the retry window, pointing at the new attempt
            assert!(conn.exists(&QueueService::pending_key(job.id)).await.unwrap());

            conn.del(&t.retry).await.unwrap();
            conn.del(&QueueService::pending_key(job.id)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        if let Some(t) = test_service().await {
            let job = test_job();
            let execution = JobExecution::queued(job.id);
            t.executions.create(&execution).await.unwrap();

            let mut payload = JobPayload::for_job(&job, execution.id, DEFAULT_MAX_RETRIES);
            payload.retry_count = DEFAULT_MAX_RETRIES;

            let mut conn = t.pool.get();
            conn.set_with_ttl(
                &QueueService::pending_key(job.id),
                &execution.id.to_string(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

            let result = JobResult::failure(execution.id, Some(500), "HTTP status 500: oops");
            t.service.handle_result(&payload, &result).await.unwrap();

            let stored = t.executions.find_by_id(execution.id).await.unwrap().unwrap();
            assert_eq!(stored.status, ExecutionStatus::Failed);
            assert!(stored.finished_at.is_some());

            assert!(!conn.exists(&QueueService::pending_key(job.id)).await.unwrap());

            let envelopes = conn.list_range(&t.dead, 0, -1).await.unwrap();
            assert_eq!(envelopes.len(), 1);
            let dead: DeadLetter = serde_json::from_str(&envelopes[0]).unwrap();
            assert_eq!(dead.payload.retry_count, DEFAULT_MAX_RETRIES);
            assert!(dead.error_message.contains("HTTP status 500"));

            conn.del(&t.dead).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_success_clears_marker_and_finishes_row() {
        if let Some(t) = test_service().await {
            let job = test_job();
            let execution = JobExecution::queued(job.id);
            t.executions.create(&execution).await.unwrap();

            let mut conn = t.pool.get();
            conn.set_with_ttl(
                &QueueService::pending_key(job.id),
                &execution.id.to_string(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

            let payload = JobPayload::for_job(&job, execution.id, DEFAULT_MAX_RETRIES);
            let result = JobResult::success(execution.id, 200);
            t.service.handle_result(&payload, &result).await.unwrap();

            let stored = t.executions.find_by_id(execution.id).await.unwrap().unwrap();
            assert_eq!(stored.status, ExecutionStatus::Success);
            assert_eq!(stored.response_code, Some(200));
            assert!(stored.finished_at.is_some());

            assert!(!conn.exists(&QueueService::pending_key(job.id)).await.unwrap());
        }
    }
}

//! Retry dispatcher: moves due payloads from the delayed set to the ready list

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::broker::RedisPool;
use crate::jobs::{JOB_QUEUE, RETRY_QUEUE};
use crate::Result;

/// How often the delayed set is drained
const POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Pause after a broker error before polling again
const ERROR_BACKOFF: Duration = Duration::from_secs(10);

/// Long-running loop draining due retries back to the ready list
///
/// The remove-then-push pair is not transactional: a crash between the two
/// loses the payload. Accepted above an at-least-once surface; a production
/// hardening would make the move a single broker script.
pub struct RetryDispatcher {
    pool: RedisPool,
    ready_list: String,
    retry_set: String,
}

impl RetryDispatcher {
    /// Create a dispatcher on the standard `cronnect:*` keys
    pub fn new(pool: RedisPool) -> Self {
        Self::with_queue_names(pool, JOB_QUEUE, RETRY_QUEUE)
    }

    /// Create a dispatcher on a custom key namespace (isolated deployments
    /// and tests); must match the queue service it serves
    pub fn with_queue_names(
        pool: RedisPool,
        ready_list: impl Into<String>,
        retry_set: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            ready_list: ready_list.into(),
            retry_set: retry_set.into(),
        }
    }

    /// Start the dispatch loop
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!("retry dispatcher started");

        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        loop {
            match self.dispatch_due().await {
                Ok(moved) => {
                    if moved > 0 {
                        debug!(moved, "dispatched due retries");
                    }
                }
                Err(e) => {
                    error!(error = %e, "error processing retry queue");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                    continue;
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Move every payload whose due time has arrived; returns how many moved
    pub async fn dispatch_due(&self) -> Result<usize> {
        let mut conn = self.pool.get();
        let now = Utc::now().timestamp() as f64;

        let due = conn
            .zrange_by_score_with_scores(&self.retry_set, 0.0, now)
            .await?;

        let mut moved = 0;
        for (payload_json, _score) in due {
            conn.zrem(&self.retry_set, &payload_json).await?;
            conn.push_head(&self.ready_list, &payload_json).await?;
            moved += 1;
            info!("moved job from retry queue back to ready queue");
        }

        Ok(moved)
    }
}

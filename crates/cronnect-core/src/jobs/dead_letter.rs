//! Dead letters: payloads whose retries were exhausted, kept for inspection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::broker::RedisPool;
use crate::jobs::DEAD_QUEUE;
use crate::models::JobPayload;
use crate::Result;

/// Envelope pushed to the dead list on terminal failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub payload: JobPayload,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Wrap a payload with its final error
    pub fn new(payload: JobPayload, error_message: impl Into<String>) -> Self {
        Self {
            payload,
            error_message: error_message.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Read-only view over the dead list for offline inspection
pub struct DeadLetterLog {
    pool: RedisPool,
    dead_list: String,
}

impl DeadLetterLog {
    /// Inspect the standard dead list
    pub fn new(pool: RedisPool) -> Self {
        Self::with_queue_name(pool, DEAD_QUEUE)
    }

    /// Inspect a custom dead list
    pub fn with_queue_name(pool: RedisPool, dead_list: impl Into<String>) -> Self {
        Self {
            pool,
            dead_list: dead_list.into(),
        }
    }

    /// Number of dead letters
    pub async fn len(&self) -> Result<i64> {
        let mut conn = self.pool.get();
        Ok(conn.list_len(&self.dead_list).await?)
    }

    /// Fetch up to `limit` dead letters, newest first; undecodable entries
    /// are logged and skipped
    pub async fn fetch(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let mut conn = self.pool.get();
        let raw = conn
            .list_range(&self.dead_list, 0, limit.saturating_sub(1) as isize)
            .await?;

        let mut letters = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str::<DeadLetter>(&entry) {
                Ok(letter) => letters.push(letter),
                Err(e) => warn!(error = %e, "skipping undecodable dead letter"),
            }
        }

        Ok(letters)
    }
}

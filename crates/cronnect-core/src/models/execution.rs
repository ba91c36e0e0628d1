//! Job execution rows: one row per attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Status of a single execution attempt
///
/// `Retry` is terminal for the row itself: the next attempt gets its own row
/// once the retry dispatcher moves the payload back to the ready list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Published to the ready list, not yet picked up
    Queued,

    /// A worker is performing the HTTP request
    Running,

    /// Target answered 2xx
    Success,

    /// Transport error, non-2xx response, or retries exhausted
    Failed,

    /// Attempt failed and a retry was queued in the delayed set
    Retry,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Queued => write!(f, "queued"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Retry => write!(f, "retry"),
        }
    }
}

impl TryFrom<String> for ExecutionStatus {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self> {
        match value.as_str() {
            "queued" => Ok(ExecutionStatus::Queued),
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "retry" => Ok(ExecutionStatus::Retry),
            other => Err(Error::Validation(format!("unknown execution status: {}", other))),
        }
    }
}

impl ExecutionStatus {
    /// Whether this status carries a finish time
    ///
    /// Invariant: `finished_at` is set iff the status is success or failed.
    pub fn is_finished(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

/// A single attempt to fire a job
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JobExecution {
    /// Unique execution ID
    pub id: Uuid,

    /// Job this attempt belongs to
    pub job_id: Uuid,

    /// When the attempt was published
    pub started_at: DateTime<Utc>,

    /// When the attempt reached success or failed; absent otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Attempt status
    #[sqlx(try_from = "String")]
    pub status: ExecutionStatus,

    /// HTTP response code; absent when the failure happened pre-dispatch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<i32>,
}

impl JobExecution {
    /// Create a fresh queued execution for a job
    pub fn queued(job_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            started_at: Utc::now(),
            finished_at: None,
            status: ExecutionStatus::Queued,
            response_code: None,
        }
    }

    /// Mark the attempt as picked up by a worker
    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
    }

    /// Apply a terminal-or-retry outcome, keeping the finish-time invariant
    pub fn apply_outcome(
        &mut self,
        status: ExecutionStatus,
        response_code: Option<i32>,
        completed_at: DateTime<Utc>,
    ) {
        self.status = status;
        self.response_code = response_code;
        self.finished_at = if status.is_finished() {
            Some(completed_at)
        } else {
            None
        };
    }
}

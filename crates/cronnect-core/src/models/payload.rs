//! Broker wire types: payloads travelling worker-ward, results coming back

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{ExecutionStatus, Job};

/// The in-broker message representing one scheduled attempt
///
/// Lives only between publish and terminal handling; never persisted in the
/// relational store. Field names are the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: Uuid,
    pub name: String,
    pub url: String,
    pub method: String,

    /// Extra request headers; empty on the publish path today
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    /// Request body; empty on the publish path today
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    pub execution_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub max_retries: u32,
    pub retry_count: u32,
}

impl JobPayload {
    /// Build the first-attempt payload for a job
    pub fn for_job(job: &Job, execution_id: Uuid, max_retries: u32) -> Self {
        Self {
            job_id: job.id,
            name: job.name.clone(),
            url: job.url.clone(),
            method: job.method.clone(),
            headers: None,
            body: None,
            execution_id,
            scheduled_at: Utc::now(),
            max_retries,
            retry_count: 0,
        }
    }

    /// Whether another attempt may be queued after a failure
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Outcome of one attempt, reported by a worker to the queue service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub execution_id: Uuid,

    pub status: ExecutionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub completed_at: DateTime<Utc>,
}

impl JobResult {
    /// Successful 2xx attempt
    pub fn success(execution_id: Uuid, response_code: i32) -> Self {
        Self {
            execution_id,
            status: ExecutionStatus::Success,
            response_code: Some(response_code),
            error_message: None,
            completed_at: Utc::now(),
        }
    }

    /// Failed attempt; `response_code` is None for pre-dispatch and
    /// transport-layer failures
    pub fn failure(
        execution_id: Uuid,
        response_code: Option<i32>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            status: ExecutionStatus::Failed,
            response_code,
            error_message: Some(error_message.into()),
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> JobPayload {
        let job = Job::new("user-1", "ping", "https://example.com/", "* * * * *");
        JobPayload::for_job(&job, Uuid::new_v4(), 3)
    }

    #[test]
    fn test_first_attempt_payload() {
        let p = payload();
        assert_eq!(p.retry_count, 0);
        assert_eq!(p.max_retries, 3);
        assert!(p.headers.is_none());
        assert!(p.body.is_none());
        assert!(p.can_retry());
    }

    #[test]
    fn test_can_retry_stops_at_max() {
        let mut p = payload();
        p.retry_count = 3;
        assert!(!p.can_retry());
    }

    #[test]
    fn test_payload_wire_field_names() {
        let value = serde_json::to_value(payload()).unwrap();
        let object = value.as_object().unwrap();

        for key in [
            "job_id",
            "name",
            "url",
            "method",
            "execution_id",
            "scheduled_at",
            "max_retries",
            "retry_count",
        ] {
            assert!(object.contains_key(key), "missing wire field {}", key);
        }

        // Optional fields stay off the wire when unset
        assert!(!object.contains_key("headers"));
        assert!(!object.contains_key("body"));
    }

    #[test]
    fn test_payload_round_trip() {
        let original = payload();
        let json = serde_json::to_string(&original).unwrap();
        let decoded: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_result_wire_format() {
        let ok = JobResult::success(Uuid::new_v4(), 204);
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["response_code"], 204);
        assert!(value.get("error_message").is_none());

        let failed = JobResult::failure(Uuid::new_v4(), None, "HTTP request failed: refused");
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(value["status"], "failed");
        assert!(value.get("response_code").is_none());
        assert!(value["error_message"].as_str().unwrap().contains("HTTP request failed"));
    }
}

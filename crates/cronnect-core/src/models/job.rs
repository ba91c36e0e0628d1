//! Job entity: a user-owned, schedule-driven HTTP probe

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Methods a job is allowed to fire with
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job fires on its schedule
    Active,

    /// Job is registered but never fires
    Paused,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Active
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Active => write!(f, "active"),
            JobStatus::Paused => write!(f, "paused"),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self> {
        match value.as_str() {
            "active" => Ok(JobStatus::Active),
            "paused" => Ok(JobStatus::Paused),
            other => Err(Error::Validation(format!("unknown job status: {}", other))),
        }
    }
}

/// A scheduled HTTP job
///
/// The core treats jobs as read-mostly: they are created and updated through
/// the repository layer and only loaded here when the scheduler (re)builds
/// its cron entries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique job ID
    pub id: Uuid,

    /// Owning user (opaque identifier from the auth layer)
    pub user_id: String,

    /// Display name
    pub name: String,

    /// Target URL
    pub url: String,

    /// HTTP method, uppercase
    pub method: String,

    /// Standard 5-field cron expression
    pub schedule: String,

    /// Whether the scheduler registers this job
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
}

impl Job {
    /// Create a new active GET job
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: name.into(),
            url: url.into(),
            method: "GET".to_string(),
            schedule: schedule.into(),
            status: JobStatus::Active,
        }
    }

    /// Set the HTTP method
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    /// Check that the job is well-formed before it reaches the pipeline
    ///
    /// The repository calls this on create/update so a bad schedule never
    /// gets persisted. The scheduler still tolerates parse failures at load
    /// time (logged, job skipped) for rows written before this check existed.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::Validation("job user_id must not be empty".to_string()));
        }

        if self.name.trim().is_empty() {
            return Err(Error::Validation("job name must not be empty".to_string()));
        }

        url::Url::parse(&self.url)
            .map_err(|e| Error::Validation(format!("invalid job url {}: {}", self.url, e)))?;

        if !ALLOWED_METHODS.contains(&self.method.as_str()) {
            return Err(Error::Validation(format!(
                "unsupported http method: {}",
                self.method
            )));
        }

        crate::jobs::scheduler::parse_schedule(&self.schedule)?;

        Ok(())
    }

    /// Whether the scheduler should register this job
    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_job() -> Job {
        Job::new("user-1", "ping prod", "https://example.com/health", "*/5 * * * *")
    }

    #[test]
    fn test_new_job_defaults() {
        let job = valid_job();
        assert_eq!(job.method, "GET");
        assert_eq!(job.status, JobStatus::Active);
        assert!(job.is_active());
    }

    #[test]
    fn test_validate_accepts_well_formed_job() {
        assert!(valid_job().validate().is_ok());
        assert!(valid_job().with_method("POST").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_user() {
        let mut job = valid_job();
        job.user_id = "  ".to_string();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut job = valid_job();
        job.url = "not a url".to_string();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_method() {
        let job = valid_job().with_method("FETCH");
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_schedule() {
        let mut job = valid_job();
        job.schedule = "every five minutes".to_string();
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_string(&JobStatus::Active).unwrap(), "\"active\"");
        assert_eq!(serde_json::to_string(&JobStatus::Paused).unwrap(), "\"paused\"");

        let status: JobStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(status, JobStatus::Paused);
    }

    #[test]
    fn test_status_try_from_string() {
        assert_eq!(JobStatus::try_from("active".to_string()).unwrap(), JobStatus::Active);
        assert!(JobStatus::try_from("deleted".to_string()).is_err());
    }
}

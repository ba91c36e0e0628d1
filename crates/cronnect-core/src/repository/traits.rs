//! Repository traits for store abstraction
//!
//! These traits define the interface every storage backend must provide.
//! The pipeline only sees trait objects, so the relational driver stays an
//! external collaborator.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Job, JobExecution};
use crate::Result;

/// Job repository trait - store agnostic
#[async_trait]
pub trait JobRepositoryTrait: Send + Sync + 'static {
    /// Find job by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>>;

    /// List all jobs
    async fn list(&self) -> Result<Vec<Job>>;

    /// List jobs owned by a user
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Job>>;

    /// Create a new job; validates before persisting
    async fn create(&self, job: &Job) -> Result<()>;

    /// Update a job; validates before persisting
    async fn update(&self, job: &Job) -> Result<()>;

    /// Delete a job; true when the job existed
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Execution repository trait - store agnostic
#[async_trait]
pub trait ExecutionRepositoryTrait: Send + Sync + 'static {
    /// Find execution by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>>;

    /// List executions recorded for a job, newest first
    async fn list_for_job(&self, job_id: Uuid) -> Result<Vec<JobExecution>>;

    /// Insert a new execution row
    async fn create(&self, execution: &JobExecution) -> Result<()>;

    /// Persist an updated execution row
    async fn save(&self, execution: &JobExecution) -> Result<()>;
}

//! In-memory repositories
//!
//! Second storage backend behind the same traits: used by tests and by
//! single-process demos where a relational store is overkill.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Job, JobExecution};
use crate::repository::traits::{ExecutionRepositoryTrait, JobRepositoryTrait};
use crate::Result;

#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepositoryTrait for InMemoryJobRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    async fn create(&self, job: &Job) -> Result<()> {
        job.validate()?;
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        job.validate()?;
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.jobs.write().await.remove(&id).is_some())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryExecutionRepository {
    executions: Arc<RwLock<HashMap<Uuid, JobExecution>>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored (test helper)
    pub async fn len(&self) -> usize {
        self.executions.read().await.len()
    }
}

#[async_trait]
impl ExecutionRepositoryTrait for InMemoryExecutionRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>> {
        Ok(self.executions.read().await.get(&id).cloned())
    }

    async fn list_for_job(&self, job_id: Uuid) -> Result<Vec<JobExecution>> {
        let mut executions: Vec<JobExecution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|execution| execution.job_id == job_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }

    async fn create(&self, execution: &JobExecution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn save(&self, execution: &JobExecution) -> Result<()> {
        self.executions
            .write()
            .await
            .insert(execution.id, execution.clone());
        Ok(())
    }
}

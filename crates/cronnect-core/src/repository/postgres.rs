//! Postgres-backed repositories

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Job, JobExecution};
use crate::repository::traits::{ExecutionRepositoryTrait, JobRepositoryTrait};
use crate::Result;

#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepositoryTrait for PgJobRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT id, user_id, name, url, method, schedule, status FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT id, user_id, name, url, method, schedule, status FROM jobs ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            "SELECT id, user_id, name, url, method, schedule, status FROM jobs WHERE user_id = $1 ORDER BY name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn create(&self, job: &Job) -> Result<()> {
        job.validate()?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, user_id, name, url, method, schedule, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(&job.user_id)
        .bind(&job.name)
        .bind(&job.url)
        .bind(&job.method)
        .bind(&job.schedule)
        .bind(job.status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        job.validate()?;

        sqlx::query(
            r#"
            UPDATE jobs
            SET user_id = $2, name = $3, url = $4, method = $5, schedule = $6, status = $7
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(&job.user_id)
        .bind(&job.name)
        .bind(&job.url)
        .bind(&job.method)
        .bind(&job.schedule)
        .bind(job.status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepositoryTrait for PgExecutionRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>> {
        let execution = sqlx::query_as::<_, JobExecution>(
            "SELECT id, job_id, started_at, finished_at, status, response_code FROM job_executions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(execution)
    }

    async fn list_for_job(&self, job_id: Uuid) -> Result<Vec<JobExecution>> {
        let executions = sqlx::query_as::<_, JobExecution>(
            r#"
            SELECT id, job_id, started_at, finished_at, status, response_code
            FROM job_executions
            WHERE job_id = $1
            ORDER BY started_at DESC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(executions)
    }

    async fn create(&self, execution: &JobExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO job_executions (id, job_id, started_at, finished_at, status, response_code)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(execution.id)
        .bind(execution.job_id)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.status.to_string())
        .bind(execution.response_code)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save(&self, execution: &JobExecution) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET finished_at = $2, status = $3, response_code = $4
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.finished_at)
        .bind(execution.status.to_string())
        .bind(execution.response_code)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

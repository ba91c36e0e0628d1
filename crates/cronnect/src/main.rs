//! cronnect service entry point
//!
//! Wires the pipeline together: storage, broker, scheduler, retry
//! dispatcher, and the worker pool, then runs until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cronnect_core::{
    db, Config, ExecutionRepositoryTrait, JobRepositoryTrait, PgExecutionRepository,
    PgJobRepository, QueueService, RateLimiter, RedisPool, RetryDispatcher, Scheduler, WorkerPool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = cronnect_core::VERSION, "starting cronnect");

    let config = Config::from_env().context("failed to load configuration")?;

    let pg = db::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    db::migrate::run(&pg).await.context("failed to run migrations")?;

    let pool = RedisPool::connect(config.broker.clone())
        .await
        .context("failed to connect to broker")?;

    let jobs: Arc<dyn JobRepositoryTrait> = Arc::new(PgJobRepository::new(pg.clone()));
    let executions: Arc<dyn ExecutionRepositoryTrait> =
        Arc::new(PgExecutionRepository::new(pg.clone()));

    let queue = Arc::new(QueueService::new(pool.clone(), executions.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(pool.clone(), config.rate_limit.clone()));

    let scheduler = Arc::new(Scheduler::new(jobs, queue.clone(), rate_limiter));
    scheduler.clone().start().await.context("failed to start scheduler")?;

    Arc::new(RetryDispatcher::new(pool.clone())).start();

    info!(count = config.workers.count, "starting workers");
    let workers = WorkerPool::start(config.workers.count, queue, executions)
        .await
        .context("failed to start workers")?;

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown")?;

    info!("shutting down");
    workers.stop().await;

    Ok(())
}

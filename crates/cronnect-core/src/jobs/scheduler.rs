//! Time-triggered scheduling of jobs from cron expressions

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::RateLimiter;
use crate::jobs::QueueService;
use crate::models::Job;
use crate::repository::JobRepositoryTrait;
use crate::{Error, Result};

/// Engine tick granularity; schedules resolve to minutes, the tick just
/// bounds firing latency
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Normalize a standard 5-field cron expression to the 6-field form the
/// `cron` crate parses, by pinning the seconds column to zero
fn normalize_schedule(expr: &str) -> Result<String> {
    let trimmed = expr.trim();
    let fields = trimmed.split_whitespace().count();

    if fields != 5 {
        return Err(Error::Schedule(format!(
            "expected 5 fields (minute hour day month weekday), got {}",
            fields
        )));
    }

    Ok(format!("0 {}", trimmed))
}

/// Parse a standard 5-field cron expression
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let normalized = normalize_schedule(expr)?;
    Schedule::from_str(&normalized).map_err(|e| Error::Schedule(format!("{}: {}", expr, e)))
}

/// One registered job with its parsed schedule and next fire time
///
/// Each entry holds its own snapshot of the job, so a fire callback never
/// observes another entry's job.
struct CronEntry {
    job: Job,
    schedule: Schedule,
    next_fire: DateTime<Utc>,
}

/// The in-process cron table
pub(crate) struct CronEngine {
    entries: Vec<CronEntry>,
}

impl CronEngine {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a job; fails when its schedule does not parse
    pub(crate) fn register(&mut self, job: Job, now: DateTime<Utc>) -> Result<()> {
        let schedule = parse_schedule(&job.schedule)?;
        let next_fire = schedule
            .after(&now)
            .next()
            .ok_or_else(|| Error::Schedule(format!("schedule {} never fires", job.schedule)))?;

        self.entries.push(CronEntry {
            job,
            schedule,
            next_fire,
        });

        Ok(())
    }

    /// Jobs whose fire time has arrived; each fires at most once per
    /// matching minute, and ticks missed across pauses are not coalesced
    pub(crate) fn due(&mut self, now: DateTime<Utc>) -> Vec<Job> {
        let mut due = Vec::new();

        for entry in &mut self.entries {
            if entry.next_fire <= now {
                due.push(entry.job.clone());
                entry.next_fire = entry
                    .schedule
                    .after(&now)
                    .next()
                    .unwrap_or(now + chrono::Duration::days(3650));
            }
        }

        due
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Single-process scheduler driving the execution pipeline
///
/// On every fire: rate-limit check, record, publish. Reload is
/// stop-the-world: the engine is rebuilt from the job store, which both
/// picks up new jobs and drops deleted ones.
pub struct Scheduler {
    jobs: Arc<dyn JobRepositoryTrait>,
    queue: Arc<QueueService>,
    rate_limiter: Arc<RateLimiter>,
    engine: Arc<RwLock<CronEngine>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        jobs: Arc<dyn JobRepositoryTrait>,
        queue: Arc<QueueService>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            jobs,
            queue,
            rate_limiter,
            engine: Arc::new(RwLock::new(CronEngine::new())),
        }
    }

    /// Load all jobs and start the tick loop
    pub async fn start(self: Arc<Self>) -> Result<JoinHandle<()>> {
        self.reload().await?;

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            scheduler.run().await;
        });

        info!("scheduler started");
        Ok(handle)
    }

    /// Rebuild the cron table from the job store
    ///
    /// Called on startup and by the CRUD layer after any job
    /// create/update/delete. Jobs with unparseable schedules are logged and
    /// skipped; paused jobs are not registered.
    pub async fn reload(&self) -> Result<()> {
        let jobs = self.jobs.list().await?;
        let now = Utc::now();

        let mut engine = self.engine.write().await;
        engine.clear();

        for job in jobs {
            if !job.is_active() {
                debug!(job = %job.name, "job is paused, not scheduling");
                continue;
            }

            let name = job.name.clone();
            match engine.register(job, now) {
                Ok(()) => info!(job = %name, "scheduled job"),
                Err(e) => warn!(job = %name, error = %e, "failed to schedule job"),
            }
        }

        info!(scheduled = engine.len(), "scheduler reloaded");
        Ok(())
    }

    /// Number of registered schedules
    pub async fn scheduled_count(&self) -> usize {
        self.engine.read().await.len()
    }

    async fn run(&self) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let due = self.engine.write().await.due(Utc::now());
            for job in due {
                self.fire(&job).await;
            }
        }
    }

    /// One scheduled fire: gate on the rate limiter, record, publish
    async fn fire(&self, job: &Job) {
        match self.rate_limiter.check(&job.user_id).await {
            Ok(decision) if !decision.allowed => {
                warn!(
                    job = %job.name,
                    user = %job.user_id,
                    reset_at = %decision.reset_at,
                    "rate limit exceeded, dropping scheduled fire"
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!(job = %job.name, user = %job.user_id, error = %e, "rate limit check failed");
                return;
            }
        }

        if let Err(e) = self.rate_limiter.record(&job.user_id).await {
            warn!(job = %job.name, user = %job.user_id, error = %e, "failed to record fire");
        }

        if let Err(e) = self.queue.publish(job).await {
            error!(job = %job.name, error = %e, "failed to publish job");
        }
    }
}

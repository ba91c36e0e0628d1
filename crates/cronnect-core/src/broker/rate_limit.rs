//! Per-user sliding-window rate limiting over a broker sorted set
//!
//! Each user owns a sorted set `rate_limit:<user_id>` whose members are
//! nanosecond timestamps scored by fire epoch seconds. Evicting entries older
//! than the window on every read gives an exact rolling window with no
//! bucket-boundary artifacts; the key TTL bounds memory for idle users.
//!
//! `check` and `record` are not atomic together. Under the single-scheduler
//! assumption the window has one writer per user, so the race cannot
//! over-admit.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::broker::{BrokerResult, RedisPool};

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Fires allowed per user per window
    #[serde(default = "default_max_pings")]
    pub max_pings_per_hour: i64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_pings_per_hour: default_max_pings(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitConfig {
    /// Get the window as Duration
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_max_pings() -> i64 {
    100
}

fn default_window_secs() -> u64 {
    3600
}

/// Outcome of a pre-fire rate check
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the fire may proceed
    pub allowed: bool,

    /// Fires left in the current window
    pub remaining: i64,

    /// When the window frees up again
    pub reset_at: DateTime<Utc>,
}

/// Point-in-time usage snapshot for a user
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub used: i64,
    pub remaining: i64,
    pub limit: i64,
    pub reset_at: DateTime<Utc>,
}

/// Sliding-window limiter gating scheduler fires
#[derive(Clone)]
pub struct RateLimiter {
    pool: RedisPool,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(pool: RedisPool, config: RateLimitConfig) -> Self {
        Self { pool, config }
    }

    fn window_key(user_id: &str) -> String {
        format!("rate_limit:{}", user_id)
    }

    fn window_chrono(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.window_secs as i64)
    }

    /// Evict entries that fell out of the window, then report whether the
    /// user may fire. Does not mutate the window beyond the eviction.
    pub async fn check(&self, user_id: &str) -> BrokerResult<RateLimitDecision> {
        let key = Self::window_key(user_id);
        let now = Utc::now();

        let mut conn = self.pool.get();
        let (used, reset_at) = self.evict_and_measure(&mut conn, &key, now).await?;

        let remaining = (self.config.max_pings_per_hour - used).max(0);
        let allowed = used < self.config.max_pings_per_hour;

        debug!(user = user_id, used, remaining, allowed, "rate limit check");

        Ok(RateLimitDecision {
            allowed,
            remaining,
            reset_at,
        })
    }

    /// Record one fire for the user and refresh the key TTL to 2x window
    pub async fn record(&self, user_id: &str) -> BrokerResult<()> {
        let key = Self::window_key(user_id);
        let now = Utc::now();

        // Nanosecond member keeps entries distinct when two fires land in
        // the same second.
        let member = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp().saturating_mul(1_000_000_000))
            .to_string();

        let mut conn = self.pool.get();
        conn.zadd(&key, now.timestamp() as f64, &member).await?;
        conn.expire(&key, self.config.window() * 2).await?;

        Ok(())
    }

    /// Usage snapshot after evicting expired entries
    pub async fn status(&self, user_id: &str) -> BrokerResult<RateLimitStatus> {
        let key = Self::window_key(user_id);
        let now = Utc::now();

        let mut conn = self.pool.get();
        let (used, reset_at) = self.evict_and_measure(&mut conn, &key, now).await?;

        Ok(RateLimitStatus {
            used,
            remaining: (self.config.max_pings_per_hour - used).max(0),
            limit: self.config.max_pings_per_hour,
            reset_at,
        })
    }

    /// Shared eviction + cardinality + reset-time computation
    async fn evict_and_measure(
        &self,
        conn: &mut crate::broker::BrokerConnection,
        key: &str,
        now: DateTime<Utc>,
    ) -> BrokerResult<(i64, DateTime<Utc>)> {
        let window_start = now - self.window_chrono();
        conn.zrem_range_by_score(key, 0.0, window_start.timestamp() as f64)
            .await?;

        let used = conn.zcard(key).await?;

        // The oldest surviving entry determines when capacity frees up.
        let oldest = conn
            .zrange_by_score_with_scores_limit(key, 0.0, now.timestamp() as f64, 0, 1)
            .await?;

        let reset_at = match oldest.first() {
            Some((_, score)) => DateTime::from_timestamp(*score as i64, 0)
                .unwrap_or(now)
                + self.window_chrono(),
            None => now + self.window_chrono(),
        };

        Ok((used, reset_at))
    }
}

//! Database access utilities

pub mod migrate;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::Result;

/// Connection attempts before giving up; the database container often comes
/// up after the service does.
const CONNECT_ATTEMPTS: u32 = 30;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Connect to Postgres, retrying while the database comes up
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    let dsn = config.dsn();
    let mut last_error = None;

    for attempt in 1..=CONNECT_ATTEMPTS {
        match PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&dsn)
            .await
        {
            Ok(pool) => {
                info!(host = %config.host, db = %config.name, "connected to database");
                return Ok(pool);
            }
            Err(e) => {
                warn!(attempt, max = CONNECT_ATTEMPTS, error = %e, "database not ready");
                last_error = Some(e);
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
    }

    Err(crate::Error::Database(last_error.unwrap_or(sqlx::Error::PoolClosed)))
}

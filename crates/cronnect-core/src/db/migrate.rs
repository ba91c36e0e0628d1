//! Schema migrations, applied on startup

use sqlx::{PgPool, Row};
use tracing::{error, info};

use crate::{Error, Result};

/// Database migration manager
pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    /// Create a new migrator instance
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize migration tracking table
    async fn init_migration_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get versions of applied migrations
    async fn applied_versions(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query(r#"SELECT version FROM _migrations ORDER BY version"#)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.get("version")).collect())
    }

    /// Record a migration as applied
    async fn record_migration(&self, version: i64, name: &str) -> Result<()> {
        sqlx::query(r#"INSERT INTO _migrations (version, name) VALUES ($1, $2) ON CONFLICT DO NOTHING"#)
            .bind(version)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Run all pending migrations
    pub async fn migrate(&self) -> Result<()> {
        self.init_migration_table().await?;

        let applied = self.applied_versions().await?;

        let migrations = vec![(
            1_i64,
            "initial_schema",
            include_str!("../../migrations/001_initial_schema.sql"),
        )];

        for (version, name, sql) in migrations {
            if applied.contains(&version) {
                continue;
            }

            info!(version, name, "applying migration");

            // Run as a single batch so multi-statement files stay atomic
            sqlx::raw_sql(sql).execute(&self.pool).await.map_err(|e| {
                error!(version, error = %e, "migration failed");
                Error::Database(e)
            })?;

            self.record_migration(version, name).await?;
        }

        Ok(())
    }
}

/// Run all pending migrations on the given pool
pub async fn run(pool: &PgPool) -> Result<()> {
    Migrator::new(pool.clone()).migrate().await
}

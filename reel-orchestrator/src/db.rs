//! Database connection lifecycle
//!
//! [`Database`] is created once by the composition root, handed to the
//! repositories and closed on shutdown.

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Owned connection pool with an explicit connect/close lifecycle
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connects to Postgres at `database_url`
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes every connection; in-flight queries are allowed to finish
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database connections closed");
    }

    /// Creates the schema if it does not exist yet
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let pool = &self.pool;

        // Create proxies table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS proxies (
                address TEXT PRIMARY KEY,
                profile_name TEXT UNIQUE,
                added_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Create profiles table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                name TEXT PRIMARY KEY,
                proxy TEXT NOT NULL UNIQUE REFERENCES proxies(address),
                session_dir TEXT NOT NULL,
                fingerprint TEXT,
                machine_id TEXT NOT NULL,
                status VARCHAR(20) NOT NULL,
                credit_remaining INTEGER,
                daily_run_count INTEGER NOT NULL DEFAULT 0,
                last_run_at TIMESTAMPTZ,
                last_credit_check_at TIMESTAMPTZ,
                lease_holder TEXT,
                lease_expires_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Create tasks table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                product_code TEXT NOT NULL,
                prompt TEXT NOT NULL,
                image_urls TEXT[] NOT NULL DEFAULT '{}',
                duration INTEGER,
                resolution TEXT,
                width INTEGER,
                height INTEGER,
                status VARCHAR(20) NOT NULL,
                profile_name TEXT,
                result_url TEXT,
                error_message TEXT,
                claimed_at TIMESTAMPTZ,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Create daily stats table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_stats (
                date DATE PRIMARY KEY,
                total_tasks BIGINT NOT NULL DEFAULT 0,
                completed_tasks BIGINT NOT NULL DEFAULT 0,
                failed_tasks BIGINT NOT NULL DEFAULT 0,
                total_videos BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        // Create indexes for selection and lookups
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_profiles_selection ON profiles(machine_id, status, last_run_at)",
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_proxies_unassigned ON proxies(added_at) WHERE profile_name IS NULL")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status)")
            .execute(pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_profile ON tasks(profile_name)")
            .execute(pool)
            .await?;

        tracing::info!("Database migrations completed successfully");
        Ok(())
    }
}

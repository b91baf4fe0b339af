//! Configuration module
//!
//! Handles CLI configuration and opening the stores it points at.

use anyhow::{Context, Result};
use reel_orchestrator::db::Database;
use reel_orchestrator::repository::{PgProfileRepository, PgTaskRepository, ProfileScope};

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    /// Machine whose profiles the profile commands act on
    pub machine_id: String,

    pub min_credit: i32,

    pub profiles_dir: String,
}

/// `$HOSTNAME`, or "local" when it is not set
pub fn default_machine_id() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

/// Open stores for one command
pub struct Stores {
    pub db: Database,
    pub profiles: PgProfileRepository,
    pub tasks: PgTaskRepository,
}

impl Config {
    /// Connects to the database, creating the schema on first use
    pub async fn connect(&self) -> Result<Stores> {
        let db = Database::connect(&self.database_url)
            .await
            .with_context(|| format!("Failed to connect to {}", self.database_url))?;
        db.migrate().await.context("Failed to prepare database schema")?;

        let scope = ProfileScope {
            machine_id: self.machine_id.clone(),
            min_credit: self.min_credit,
            profiles_dir: self.profiles_dir.clone(),
        };

        Ok(Stores {
            profiles: PgProfileRepository::new(db.pool().clone(), scope),
            tasks: PgTaskRepository::new(db.pool().clone()),
            db,
        })
    }
}

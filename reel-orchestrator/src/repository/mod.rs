//! Repository Module
//!
//! Data access layer for the orchestrator. Each repository is a trait so the
//! scheduler can run against Postgres in production and in-memory fakes in
//! tests.
//!
//! - [`ProfileRepository`]: profiles, proxies and profile leases
//! - [`TaskRepository`]: task records and daily statistics

#[cfg(test)]
pub mod memory;
pub mod profile;
pub mod task;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reel_core::domain::profile::{Profile, ProfileStatus};
use reel_core::domain::proxy::Proxy;
use reel_core::domain::stats::{DailyStats, TaskOutcome};
use reel_core::domain::task::{Task, TaskRequest, TaskStatus, TaskUpdate};

use crate::error::Result;

pub use profile::PgProfileRepository;
pub use task::PgTaskRepository;

/// Settings shared by every profile repository implementation
#[derive(Debug, Clone)]
pub struct ProfileScope {
    /// Machine whose profiles this repository reads and mutates
    pub machine_id: String,

    /// Minimum credit for a profile to stay selectable
    pub min_credit: i32,

    /// Root directory of the per-profile browser sessions
    pub profiles_dir: String,
}

impl ProfileScope {
    pub fn session_dir(&self, name: &str) -> String {
        format!("{}/{}", self.profiles_dir.trim_end_matches('/'), name)
    }
}

/// Claim on a profile taken at selection time
#[derive(Debug, Clone)]
pub struct LeaseRequest {
    /// Orchestrator instance taking the lease
    pub holder: String,

    /// How long the lease lasts unless released
    pub ttl: chrono::Duration,
}

impl LeaseRequest {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.ttl
    }
}

/// Repository for profiles and the proxies bound to them
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Inserts proxies that are not known yet, keeping list order as age.
    ///
    /// # Returns
    /// The number of newly inserted proxies
    async fn seed_proxies(&self, addresses: &[String]) -> Result<u64>;

    async fn list_proxies(&self) -> Result<Vec<Proxy>>;

    /// Returns the named profile, creating it on the oldest free proxy.
    ///
    /// Fails with `ResourceExhausted` when no proxy is free and with
    /// `Conflict` when the name belongs to another machine.
    async fn ensure_profile(&self, name: &str) -> Result<Profile>;

    async fn get_profile(&self, name: &str) -> Result<Option<Profile>>;

    /// Profiles owned by this machine, oldest first
    async fn list_profiles(&self) -> Result<Vec<Profile>>;

    /// Picks the least recently used eligible profile and leases it.
    ///
    /// The read and the `last_run_at`/lease stamp happen as one atomic
    /// update, so two callers never receive the same profile while the lease
    /// is live.
    async fn select_available_profile(
        &self,
        excluding: &[String],
        lease: &LeaseRequest,
    ) -> Result<Option<Profile>>;

    /// Drops the lease on `name` if `holder` still owns it
    async fn release_profile(&self, name: &str, holder: &str) -> Result<bool>;

    /// Records a credit reading and moves the status accordingly
    async fn update_credit(&self, name: &str, remaining: i32) -> Result<()>;

    async fn increment_run_count(&self, name: &str) -> Result<()>;

    /// Zeroes the daily run count of every profile on this machine
    async fn reset_daily_counts(&self) -> Result<u64>;

    /// Stores the fingerprint unless one is already set.
    ///
    /// # Returns
    /// true if the fingerprint was written
    async fn set_fingerprint(&self, name: &str, fingerprint: &str) -> Result<bool>;

    async fn set_status(&self, name: &str, status: ProfileStatus) -> Result<()>;
}

/// Repository for task records and daily counters
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Records a freshly claimed task. The first write wins.
    ///
    /// # Returns
    /// true if the record was inserted, false if it already existed
    async fn save_task(&self, task: &TaskRequest, product_code: &str) -> Result<bool>;

    /// Moves a task to `status`, merging `update` into the record.
    ///
    /// # Returns
    /// false if the task is missing or the move would go backwards
    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        update: TaskUpdate,
    ) -> Result<bool>;

    /// Adds one task outcome to today's counters
    async fn increment_daily_stats(&self, outcome: TaskOutcome, video_count: i64) -> Result<()>;

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>>;

    async fn get_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>>;
}

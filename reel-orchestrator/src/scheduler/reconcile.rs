//! Worker completion handling
//!
//! Runs as the continuation of every spawned worker. Nothing here returns an
//! error: each step logs its own failure so the remaining steps still run
//! and the profile lease is always released.

use reel_core::domain::profile::Profile;
use reel_core::domain::stats::TaskOutcome;
use reel_core::domain::task::{TaskStatus, TaskUpdate};
use reel_core::domain::worker::WorkerResult;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::state::SchedulerHandle;
use crate::repository::{ProfileRepository, TaskRepository};
use crate::service::{GenerationRequest, Notifier, TaskSource, WorkerLauncher};

/// Everything a spawned worker needs, cloned out of the scheduler
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub profiles: Arc<dyn ProfileRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub source: Arc<dyn TaskSource>,
    pub launcher: Arc<dyn WorkerLauncher>,
    pub notifier: Arc<dyn Notifier>,
    pub handle: SchedulerHandle,
    pub lease_holder: String,
}

impl WorkerContext {
    /// Runs the generation and reconciles its outcome
    pub async fn run(self, task_id: String, profile: Profile, request: GenerationRequest) {
        let result = self.launcher.run_worker(&profile, &request).await;
        self.reconcile(&task_id, &profile, result).await;
    }

    pub async fn reconcile(&self, task_id: &str, profile: &Profile, result: WorkerResult) {
        if let Some(worker) = self.handle.remove(task_id) {
            let elapsed = worker.age(chrono::Utc::now());
            info!(
                "Worker for task {} finished after {}s",
                task_id,
                elapsed.num_seconds()
            );
        }

        self.record_profile_usage(profile, &result).await;

        match (result.success, result.result_url()) {
            (true, Some(url)) => self.complete(task_id, url).await,
            (true, None) => self.fail(task_id, &result, "no valid result found").await,
            (false, _) => self.fail(task_id, &result, result.error_message()).await,
        }

        self.release(profile).await;
    }

    async fn complete(&self, task_id: &str, url: &str) {
        info!("Task {} completed: {}", task_id, url);

        let update = TaskUpdate::default().with_result_url(url);
        self.update_status(task_id, TaskStatus::Completed, update)
            .await;

        if let Err(e) = self
            .tasks
            .increment_daily_stats(TaskOutcome::Completed, 1)
            .await
        {
            error!("Failed to record completion stats for {}: {}", task_id, e);
        }

        if !self.source.complete_task(task_id, url).await {
            warn!("Task source did not acknowledge completion of {}", task_id);
        }
    }

    async fn fail(&self, task_id: &str, result: &WorkerResult, reason: &str) {
        let status = if result.is_timeout() {
            TaskStatus::Timeout
        } else {
            TaskStatus::Failed
        };
        warn!("Task {} {}: {}", task_id, status, reason);

        let update = TaskUpdate::default().with_error(reason);
        self.update_status(task_id, status, update).await;

        if let Err(e) = self
            .tasks
            .increment_daily_stats(TaskOutcome::Failed, 0)
            .await
        {
            error!("Failed to record failure stats for {}: {}", task_id, e);
        }

        if !self.source.report_task(task_id, reason).await {
            warn!("Task source did not acknowledge failure of {}", task_id);
        }

        self.notifier
            .notify(&format!("Task {} {}: {}", task_id, status, reason))
            .await;
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus, update: TaskUpdate) {
        match self.tasks.update_task_status(task_id, status, update).await {
            Ok(true) => {}
            Ok(false) => warn!("Task {} was not moved to {}", task_id, status),
            Err(e) => error!("Failed to mark task {} as {}: {}", task_id, status, e),
        }
    }

    /// Run count, credit reading and fingerprint for the profile
    async fn record_profile_usage(&self, profile: &Profile, result: &WorkerResult) {
        if let Err(e) = self.profiles.increment_run_count(&profile.name).await {
            error!("Failed to count run for profile {}: {}", profile.name, e);
        }

        if let Some(remaining) = result.credits_remaining {
            match self.profiles.update_credit(&profile.name, remaining).await {
                Ok(()) => info!("Profile {} has {} credit left", profile.name, remaining),
                Err(e) => error!("Failed to update credit of {}: {}", profile.name, e),
            }
        }

        if profile.fingerprint.is_none() {
            if let Some(fingerprint) = &result.fingerprint {
                if let Err(e) = self
                    .profiles
                    .set_fingerprint(&profile.name, fingerprint)
                    .await
                {
                    error!("Failed to store fingerprint of {}: {}", profile.name, e);
                }
            }
        }
    }

    pub async fn release(&self, profile: &Profile) {
        match self
            .profiles
            .release_profile(&profile.name, &self.lease_holder)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("Lease on profile {} was no longer ours", profile.name),
            Err(e) => error!("Failed to release profile {}: {}", profile.name, e),
        }
    }
}

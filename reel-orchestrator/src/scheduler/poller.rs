//! Task poller
//!
//! Ticks on a fixed interval. Each tick checks the concurrency budget,
//! leases a profile, claims at most one task for it and starts a worker
//! without waiting for it. Workers live in a [`JoinSet`] that is drained on
//! shutdown.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use reel_core::domain::stats::today;
use reel_core::domain::task::{TaskRequest, TaskStatus, TaskUpdate};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::reconcile::WorkerContext;
use super::state::{ActiveWorker, SchedulerHandle, SchedulerState};
use crate::config::Config;
use crate::repository::{LeaseRequest, ProfileRepository, TaskRepository};
use crate::service::{GenerationRequest, Notifier, TaskSource, WorkerLauncher};

/// Loop parameters
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub product_code: String,
    pub max_concurrent_workers: usize,
    pub poll_interval: Duration,
    pub monitor_interval: Duration,
    pub lease: LeaseRequest,
}

impl SchedulerSettings {
    /// Settings for this process, leasing profiles under `instance_id`
    pub fn from_config(config: &Config, instance_id: impl Into<String>) -> Result<Self> {
        let ttl = chrono::Duration::from_std(config.lease_ttl())
            .context("Lease duration out of range")?;

        Ok(Self {
            product_code: config.product_code.clone(),
            max_concurrent_workers: config.max_concurrent_workers,
            poll_interval: config.poll_interval,
            monitor_interval: config.monitor_interval,
            lease: LeaseRequest {
                holder: instance_id.into(),
                ttl,
            },
        })
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Concurrency cap reached
    Saturated,
    /// No eligible profile; nothing was claimed
    NoProfile,
    /// A profile was available but the source had no task
    NoTask,
    /// A worker was started for this task
    Started(String),
    /// The source handed out a task that is already processing or finished
    Duplicate(String),
}

/// The scheduling control loop
pub struct Scheduler {
    settings: SchedulerSettings,
    context: WorkerContext,
    workers: JoinSet<()>,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        profiles: Arc<dyn ProfileRepository>,
        tasks: Arc<dyn TaskRepository>,
        source: Arc<dyn TaskSource>,
        launcher: Arc<dyn WorkerLauncher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let context = WorkerContext {
            profiles,
            tasks,
            source,
            launcher,
            notifier,
            handle: SchedulerHandle::default(),
            lease_holder: settings.lease.holder.clone(),
        };

        Self {
            settings,
            context,
            workers: JoinSet::new(),
        }
    }

    /// Shared view for the status API
    pub fn handle(&self) -> SchedulerHandle {
        self.context.handle.clone()
    }

    /// Runs until `shutdown` resolves, then waits for in-flight workers
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(
            "Starting scheduler (interval: {:?}, max workers: {})",
            self.settings.poll_interval, self.settings.max_concurrent_workers
        );

        let mut poll = time::interval(self.settings.poll_interval);
        let mut monitor = time::interval(self.settings.monitor_interval);
        poll.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        monitor.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        let mut current_date = today();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no further tasks will be claimed");
                    break;
                }
                _ = poll.tick() => {
                    match self.tick().await {
                        Ok(TickOutcome::Started(task_id)) => info!("Started worker for task {}", task_id),
                        Ok(outcome) => debug!("Tick skipped: {:?}", outcome),
                        Err(e) => error!("Error during poll cycle: {:#}", e),
                    }
                }
                _ = monitor.tick() => {
                    self.monitor(&mut current_date).await;
                }
            }
        }

        self.drain().await;
        Ok(())
    }

    /// Performs a single poll cycle
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        self.reap();
        let handle = self.context.handle.clone();
        handle.set_state(SchedulerState::Polling);

        let active = handle.active_count();
        if active >= self.settings.max_concurrent_workers {
            debug!(
                "Max concurrent workers reached ({}/{})",
                active, self.settings.max_concurrent_workers
            );
            handle.set_state(SchedulerState::Saturated);
            return Ok(TickOutcome::Saturated);
        }

        let outcome = self.claim_and_start().await;
        handle.set_state(if handle.active_count() > 0 {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        });
        outcome
    }

    async fn claim_and_start(&mut self) -> Result<TickOutcome> {
        let ctx = &self.context;

        let profile = ctx
            .profiles
            .select_available_profile(&ctx.handle.active_profiles(), &self.settings.lease)
            .await
            .context("Failed to select a profile")?;

        let Some(profile) = profile else {
            debug!("No profile available");
            return Ok(TickOutcome::NoProfile);
        };

        ctx.handle.set_state(SchedulerState::Claiming);
        let Some(task) = ctx.source.claim_task(&self.settings.product_code).await else {
            debug!("No task available");
            ctx.release(&profile).await;
            return Ok(TickOutcome::NoTask);
        };
        let task_id = task.task_id.clone();

        let recorded = match self.persist(&task, &profile.name).await {
            Ok(recorded) => recorded,
            Err(e) => {
                let reason = format!("failed to record task: {}", e);
                if !ctx.source.report_task(&task_id, &reason).await {
                    warn!("Task source did not take back task {}", task_id);
                }
                ctx.release(&profile).await;
                return Err(e.context(format!("Failed to persist claimed task {}", task_id)));
            }
        };

        if !recorded {
            warn!(
                "Task {} is already processing or finished, ignoring duplicate claim",
                task_id
            );
            ctx.release(&profile).await;
            return Ok(TickOutcome::Duplicate(task_id));
        }

        let worker = ActiveWorker {
            task_id: task_id.clone(),
            profile_name: profile.name.clone(),
            started_at: Utc::now(),
        };
        info!(
            "Task {} assigned to profile {} ({}s, {})",
            task_id,
            profile.name,
            task.generation_duration().seconds(),
            task.orientation()
        );
        ctx.handle.insert(worker);

        let request = GenerationRequest::from(&task);
        let worker_ctx = ctx.clone();
        self.workers
            .spawn(worker_ctx.run(task_id.clone(), profile, request));

        Ok(TickOutcome::Started(task_id))
    }

    /// Records the claim and moves the task to processing
    ///
    /// Returns `false` when an earlier claim of the same task already moved
    /// it to processing or beyond.
    async fn persist(&self, task: &TaskRequest, profile_name: &str) -> Result<bool> {
        let tasks = &self.context.tasks;

        if !tasks.save_task(task, &self.settings.product_code).await? {
            debug!("Task {} was already recorded", task.task_id);
        }

        let update = TaskUpdate::default().with_profile(profile_name);
        let moved = tasks
            .update_task_status(&task.task_id, TaskStatus::Processing, update)
            .await?;

        Ok(moved)
    }

    /// Logs worker ages and resets daily counters on date rollover
    async fn monitor(&mut self, current_date: &mut NaiveDate) {
        self.reap();

        let now = Utc::now();
        for worker in self.context.handle.active_workers() {
            debug!(
                "Task {} on profile {} running for {}s",
                worker.task_id,
                worker.profile_name,
                worker.age(now).num_seconds()
            );
        }

        let date = today();
        if date != *current_date {
            match self.context.profiles.reset_daily_counts().await {
                Ok(count) => {
                    info!("New day {}, reset run counts of {} profile(s)", date, count);
                    *current_date = date;
                }
                Err(e) => error!("Failed to reset daily run counts: {}", e),
            }
        }
    }

    /// Collects workers that already finished
    fn reap(&mut self) {
        while let Some(joined) = self.workers.try_join_next() {
            if let Err(e) = joined {
                error!("Worker task panicked: {}", e);
            }
        }
    }

    /// Waits for every in-flight worker to be reconciled
    pub async fn drain(&mut self) {
        let handle = &self.context.handle;
        handle.set_state(SchedulerState::Draining);

        if !self.workers.is_empty() {
            info!("Waiting for {} in-flight worker(s)", self.workers.len());
        }
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task panicked: {}", e);
            }
        }

        handle.set_state(SchedulerState::Stopped);
        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::repository::ProfileScope;
    use crate::repository::memory::{MemoryProfileRepository, MemoryTaskRepository};
    use async_trait::async_trait;
    use reel_core::domain::profile::{Profile, ProfileStatus};
    use reel_core::domain::stats::{DailyStats, TaskOutcome};
    use reel_core::domain::task::Task;
    use reel_core::domain::worker::{ExecutorReport, FailureKind, WorkerResult};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    // =============================================================================
    // Fakes
    // =============================================================================

    #[derive(Default)]
    struct FakeSource {
        queue: Mutex<VecDeque<TaskRequest>>,
        claims: AtomicUsize,
        completed: Mutex<Vec<(String, String)>>,
        reported: Mutex<Vec<(String, String)>>,
    }

    impl FakeSource {
        fn with_tasks(ids: &[&str]) -> Self {
            let source = Self::default();
            source
                .queue
                .lock()
                .unwrap()
                .extend(ids.iter().map(|id| task(id)));
            source
        }
    }

    #[async_trait]
    impl TaskSource for FakeSource {
        async fn claim_task(&self, _product_code: &str) -> Option<TaskRequest> {
            self.claims.fetch_add(1, Ordering::SeqCst);
            self.queue.lock().unwrap().pop_front()
        }

        async fn complete_task(&self, task_id: &str, result_url: &str) -> bool {
            self.completed
                .lock()
                .unwrap()
                .push((task_id.to_string(), result_url.to_string()));
            true
        }

        async fn report_task(&self, task_id: &str, reason: &str) -> bool {
            self.reported
                .lock()
                .unwrap()
                .push((task_id.to_string(), reason.to_string()));
            true
        }
    }

    /// Returns a fixed result, optionally holding every run until released
    struct FakeLauncher {
        result: WorkerResult,
        gate: Option<Arc<Semaphore>>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeLauncher {
        fn returning(result: WorkerResult) -> Self {
            Self {
                result,
                gate: None,
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn gated(result: WorkerResult, gate: Arc<Semaphore>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::returning(result)
            }
        }
    }

    #[async_trait]
    impl WorkerLauncher for FakeLauncher {
        async fn run_worker(&self, _profile: &Profile, _request: &GenerationRequest) -> WorkerResult {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    /// Task store whose writes always fail
    struct BrokenTaskRepository;

    #[async_trait]
    impl TaskRepository for BrokenTaskRepository {
        async fn save_task(&self, _: &TaskRequest, _: &str) -> crate::error::Result<bool> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn update_task_status(
            &self,
            _: &str,
            _: TaskStatus,
            _: TaskUpdate,
        ) -> crate::error::Result<bool> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn increment_daily_stats(&self, _: TaskOutcome, _: i64) -> crate::error::Result<()> {
            Ok(())
        }

        async fn get_task(&self, _: &str) -> crate::error::Result<Option<Task>> {
            Ok(None)
        }

        async fn get_daily_stats(&self, _: NaiveDate) -> crate::error::Result<Option<DailyStats>> {
            Ok(None)
        }
    }

    // =============================================================================
    // Harness
    // =============================================================================

    fn task(id: &str) -> TaskRequest {
        TaskRequest {
            task_id: id.to_string(),
            prompt: format!("prompt for {}", id),
            image_urls: Vec::new(),
            duration: None,
            resolution: None,
            width: None,
            height: None,
        }
    }

    fn success(url: &str) -> WorkerResult {
        WorkerResult::succeeded(ExecutorReport {
            success: true,
            public_url: Some(url.to_string()),
            download_url: None,
            job_id: None,
            error: None,
            credits_remaining: None,
            fingerprint: None,
        })
    }

    fn settings(max_concurrent_workers: usize) -> SchedulerSettings {
        SchedulerSettings {
            product_code: "video".to_string(),
            max_concurrent_workers,
            poll_interval: Duration::from_millis(10),
            monitor_interval: Duration::from_millis(10),
            lease: LeaseRequest {
                holder: "instance-a".to_string(),
                ttl: chrono::Duration::minutes(26),
            },
        }
    }

    struct Harness {
        profiles: Arc<MemoryProfileRepository>,
        tasks: Arc<MemoryTaskRepository>,
        source: Arc<FakeSource>,
        launcher: Arc<FakeLauncher>,
        notifier: Arc<RecordingNotifier>,
        scheduler: Scheduler,
    }

    fn harness(max: usize, source: FakeSource, launcher: FakeLauncher) -> Harness {
        let profiles = Arc::new(MemoryProfileRepository::new(ProfileScope {
            machine_id: "m1".to_string(),
            min_credit: 3,
            profiles_dir: "/tmp/profiles".to_string(),
        }));
        let tasks = Arc::new(MemoryTaskRepository::default());
        let source = Arc::new(source);
        let launcher = Arc::new(launcher);
        let notifier = Arc::new(RecordingNotifier::default());

        let scheduler = Scheduler::new(
            settings(max),
            profiles.clone(),
            tasks.clone(),
            source.clone(),
            launcher.clone(),
            notifier.clone(),
        );

        Harness {
            profiles,
            tasks,
            source,
            launcher,
            notifier,
            scheduler,
        }
    }

    // =============================================================================
    // Tests
    // =============================================================================

    #[tokio::test]
    async fn test_null_credit_profile_completes_task() {
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1"]),
            FakeLauncher::returning(success("https://x/1")),
        );
        h.profiles.insert(h.profiles.profile("alpha"));

        let outcome = h.scheduler.tick().await.unwrap();
        assert_eq!(outcome, TickOutcome::Started("T1".to_string()));
        h.scheduler.drain().await;

        let task = h.tasks.get_task("T1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result_url.as_deref(), Some("https://x/1"));
        assert_eq!(task.profile_name.as_deref(), Some("alpha"));
        assert!(task.started_at.is_some() && task.completed_at.is_some());
        assert_eq!(
            h.tasks.status_history("T1"),
            vec![
                TaskStatus::Claimed,
                TaskStatus::Processing,
                TaskStatus::Completed
            ]
        );

        let stats = h.tasks.get_daily_stats(today()).await.unwrap().unwrap();
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.total_videos, 1);

        assert_eq!(
            h.source.completed.lock().unwrap().as_slice(),
            [("T1".to_string(), "https://x/1".to_string())]
        );

        let profile = h.profiles.get_profile("alpha").await.unwrap().unwrap();
        assert_eq!(profile.daily_run_count, 1);
        assert!(profile.last_run_at.is_some());
        assert!(profile.lease_holder.is_none());
        assert_eq!(h.scheduler.handle().active_count(), 0);
        assert_eq!(h.scheduler.handle().state(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_low_credit_profiles_claim_nothing() {
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1"]),
            FakeLauncher::returning(success("https://x/1")),
        );
        for name in ["alpha", "beta"] {
            let mut profile = h.profiles.profile(name);
            profile.status = ProfileStatus::LowCredit;
            profile.credit_remaining = Some(1);
            h.profiles.insert(profile);
        }

        assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::NoProfile);
        assert_eq!(h.source.claims.load(Ordering::SeqCst), 0);
        assert!(h.tasks.get_task("T1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1", "T2", "T3", "T4", "T5"]),
            FakeLauncher::gated(success("https://x/v"), gate.clone()),
        );
        for name in ["alpha", "beta", "gamma"] {
            h.profiles.insert(h.profiles.profile(name));
        }

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(h.scheduler.tick().await.unwrap());
        }
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Started("T1".to_string()),
                TickOutcome::Started("T2".to_string()),
                TickOutcome::Saturated,
                TickOutcome::Saturated,
            ]
        );
        assert_eq!(h.source.claims.load(Ordering::SeqCst), 2);

        gate.add_permits(10);
        h.scheduler.drain().await;

        assert!(h.launcher.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(h.source.completed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_running_profile_is_not_reselected() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1", "T2"]),
            FakeLauncher::gated(success("https://x/v"), gate.clone()),
        );
        h.profiles.insert(h.profiles.profile("alpha"));

        assert!(matches!(
            h.scheduler.tick().await.unwrap(),
            TickOutcome::Started(_)
        ));
        assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::NoProfile);
        assert_eq!(h.source.claims.load(Ordering::SeqCst), 1);

        gate.add_permits(10);
        h.scheduler.drain().await;
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1"]),
            FakeLauncher::returning(WorkerResult::failed(
                FailureKind::Timeout,
                "worker timed out after 1500s",
            )),
        );
        h.profiles.insert(h.profiles.profile("alpha"));

        h.scheduler.tick().await.unwrap();
        h.scheduler.drain().await;

        let task = h.tasks.get_task("T1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Timeout);
        assert_eq!(
            task.error_message.as_deref(),
            Some("worker timed out after 1500s")
        );

        let stats = h.tasks.get_daily_stats(today()).await.unwrap().unwrap();
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.total_videos, 0);
        assert_eq!(h.source.reported.lock().unwrap().len(), 1);
        assert_eq!(h.notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reported_failure_marks_task_failed() {
        let report = ExecutorReport::from_final_line(
            r#"{"success":false,"error":"policy violation","creditsRemaining":2}"#,
        )
        .unwrap();
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1"]),
            FakeLauncher::returning(WorkerResult::reported(report)),
        );
        h.profiles.insert(h.profiles.profile("alpha"));

        h.scheduler.tick().await.unwrap();
        h.scheduler.drain().await;

        let task = h.tasks.get_task("T1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error_message.as_deref(), Some("policy violation"));
        assert_eq!(
            h.source.reported.lock().unwrap().as_slice(),
            [("T1".to_string(), "policy violation".to_string())]
        );

        // The credit reading still lands on the profile
        let profile = h.profiles.get_profile("alpha").await.unwrap().unwrap();
        assert_eq!(profile.credit_remaining, Some(2));
        assert_eq!(profile.status, ProfileStatus::LowCredit);
    }

    #[tokio::test]
    async fn test_fingerprint_is_stored_once() {
        let mut result = success("https://x/1");
        result.fingerprint = Some("fp-1".to_string());
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1"]),
            FakeLauncher::returning(result),
        );
        h.profiles.insert(h.profiles.profile("alpha"));

        h.scheduler.tick().await.unwrap();
        h.scheduler.drain().await;

        let profile = h.profiles.get_profile("alpha").await.unwrap().unwrap();
        assert_eq!(profile.fingerprint.as_deref(), Some("fp-1"));
    }

    #[tokio::test]
    async fn test_empty_queue_releases_lease() {
        let mut h = harness(
            2,
            FakeSource::default(),
            FakeLauncher::returning(success("https://x/1")),
        );
        h.profiles.insert(h.profiles.profile("alpha"));

        assert_eq!(h.scheduler.tick().await.unwrap(), TickOutcome::NoTask);

        let profile = h.profiles.get_profile("alpha").await.unwrap().unwrap();
        assert!(profile.lease_holder.is_none());
        assert!(profile.lease_expires_at.is_none());
        assert_eq!(h.scheduler.handle().state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_persist_failure_hands_task_back() {
        let profiles = Arc::new(MemoryProfileRepository::new(ProfileScope {
            machine_id: "m1".to_string(),
            min_credit: 3,
            profiles_dir: "/tmp/profiles".to_string(),
        }));
        profiles.insert(profiles.profile("alpha"));
        let source = Arc::new(FakeSource::with_tasks(&["T1"]));

        let mut scheduler = Scheduler::new(
            settings(2),
            profiles.clone(),
            Arc::new(BrokenTaskRepository),
            source.clone(),
            Arc::new(FakeLauncher::returning(success("https://x/1"))),
            Arc::new(RecordingNotifier::default()),
        );

        assert!(scheduler.tick().await.is_err());
        assert_eq!(scheduler.handle().active_count(), 0);

        let reported = source.reported.lock().unwrap().clone();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, "T1");

        let profile = profiles.get_profile("alpha").await.unwrap().unwrap();
        assert!(profile.lease_holder.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_claim_leaves_running_task_alone() {
        let gate = Arc::new(Semaphore::new(0));
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1", "T1"]),
            FakeLauncher::gated(success("https://x/1"), gate.clone()),
        );
        for name in ["alpha", "beta"] {
            h.profiles.insert(h.profiles.profile(name));
        }

        assert_eq!(
            h.scheduler.tick().await.unwrap(),
            TickOutcome::Started("T1".to_string())
        );
        assert_eq!(
            h.scheduler.tick().await.unwrap(),
            TickOutcome::Duplicate("T1".to_string())
        );
        assert_eq!(h.scheduler.handle().active_count(), 1);

        gate.add_permits(10);
        h.scheduler.drain().await;

        assert!(h.source.reported.lock().unwrap().is_empty());
        assert_eq!(
            h.source.completed.lock().unwrap().as_slice(),
            [("T1".to_string(), "https://x/1".to_string())]
        );
        assert_eq!(
            h.tasks.status_history("T1"),
            vec![
                TaskStatus::Claimed,
                TaskStatus::Processing,
                TaskStatus::Completed
            ]
        );
        for name in ["alpha", "beta"] {
            let profile = h.profiles.get_profile(name).await.unwrap().unwrap();
            assert!(profile.lease_holder.is_none());
        }
        assert_eq!(h.launcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_of_finished_task_is_skipped() {
        let mut h = harness(
            2,
            FakeSource::with_tasks(&["T1"]),
            FakeLauncher::returning(success("https://x/1")),
        );
        h.profiles.insert(h.profiles.profile("alpha"));

        h.scheduler.tick().await.unwrap();
        h.scheduler.drain().await;

        h.source.queue.lock().unwrap().push_back(task("T1"));
        assert_eq!(
            h.scheduler.tick().await.unwrap(),
            TickOutcome::Duplicate("T1".to_string())
        );
        assert!(h.source.reported.lock().unwrap().is_empty());
        assert_eq!(
            h.tasks.get_task("T1").await.unwrap().unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_monitor_resets_run_counts_on_new_day() {
        let mut h = harness(
            2,
            FakeSource::default(),
            FakeLauncher::returning(success("https://x/1")),
        );
        let mut profile = h.profiles.profile("alpha");
        profile.daily_run_count = 4;
        h.profiles.insert(profile);

        let yesterday = today().pred_opt().unwrap();

        h.profiles.fail_resets(true);
        let mut current_date = yesterday;
        h.scheduler.monitor(&mut current_date).await;
        assert_eq!(current_date, yesterday);
        assert_eq!(
            h.profiles.get_profile("alpha").await.unwrap().unwrap().daily_run_count,
            4
        );

        h.profiles.fail_resets(false);
        h.scheduler.monitor(&mut current_date).await;
        assert_eq!(current_date, today());
        assert_eq!(
            h.profiles.get_profile("alpha").await.unwrap().unwrap().daily_run_count,
            0
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness(
            1,
            FakeSource::with_tasks(&["T1"]),
            FakeLauncher::returning(success("https://x/1")),
        );
        h.profiles.insert(h.profiles.profile("alpha"));
        let handle = h.scheduler.handle();

        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        h.scheduler.run(shutdown).await.unwrap();

        assert_eq!(handle.state(), SchedulerState::Stopped);
        let task = h.tasks.get_task("T1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }
}

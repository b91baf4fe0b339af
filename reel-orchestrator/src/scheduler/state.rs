//! Scheduler state shared with the status API

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Where the control loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Polling,
    /// Concurrency cap reached; the tick was skipped
    Saturated,
    Claiming,
    /// At least one worker is running
    Running,
    /// Shutdown requested; waiting for in-flight workers
    Draining,
    Stopped,
}

/// A generation currently in flight
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveWorker {
    pub task_id: String,
    pub profile_name: String,
    pub started_at: DateTime<Utc>,
}

impl ActiveWorker {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }
}

#[derive(Debug)]
struct Shared {
    state: SchedulerState,
    workers: HashMap<String, ActiveWorker>,
}

/// Cloneable view of the scheduler's in-memory state
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    inner: Arc<Mutex<Shared>>,
}

impl Default for SchedulerHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Shared {
                state: SchedulerState::Idle,
                workers: HashMap::new(),
            })),
        }
    }
}

impl SchedulerHandle {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> SchedulerState {
        self.lock().state
    }

    pub(crate) fn set_state(&self, state: SchedulerState) {
        self.lock().state = state;
    }

    pub fn active_count(&self) -> usize {
        self.lock().workers.len()
    }

    /// Active workers, oldest first
    pub fn active_workers(&self) -> Vec<ActiveWorker> {
        let mut workers: Vec<ActiveWorker> = self.lock().workers.values().cloned().collect();
        workers.sort_by_key(|w| w.started_at);
        workers
    }

    /// Profiles held by workers of this process
    pub fn active_profiles(&self) -> Vec<String> {
        self.lock()
            .workers
            .values()
            .map(|w| w.profile_name.clone())
            .collect()
    }

    pub(crate) fn insert(&self, worker: ActiveWorker) {
        self.lock().workers.insert(worker.task_id.clone(), worker);
    }

    pub(crate) fn remove(&self, task_id: &str) -> Option<ActiveWorker> {
        self.lock().workers.remove(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(task_id: &str, profile: &str, started_at: DateTime<Utc>) -> ActiveWorker {
        ActiveWorker {
            task_id: task_id.to_string(),
            profile_name: profile.to_string(),
            started_at,
        }
    }

    #[test]
    fn test_workers_tracked_by_task_id() {
        let handle = SchedulerHandle::default();
        let now = Utc::now();
        handle.insert(worker("T2", "beta", now));
        handle.insert(worker("T1", "alpha", now - chrono::Duration::seconds(30)));

        let snapshot = handle.clone().active_workers();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].task_id, "T1");
        assert_eq!(snapshot[0].age(now), chrono::Duration::seconds(30));

        assert!(handle.remove("T1").is_some());
        assert!(handle.remove("T1").is_none());
        assert_eq!(handle.active_profiles(), vec!["beta".to_string()]);
    }
}

//! In-memory repositories for scheduler tests
//!
//! Mirror the Postgres semantics: selection and lease stamping happen under
//! one lock, status updates refuse to move backwards.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reel_core::domain::profile::{Profile, ProfileStatus};
use reel_core::domain::proxy::Proxy;
use reel_core::domain::stats::{DailyStats, TaskOutcome, today};
use reel_core::domain::task::{Task, TaskRequest, TaskStatus, TaskUpdate};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{LeaseRequest, ProfileRepository, ProfileScope, TaskRepository};
use crate::error::{Result, StoreError};

#[derive(Default)]
struct ProfileState {
    proxies: Vec<Proxy>,
    profiles: Vec<Profile>,
}

pub struct MemoryProfileRepository {
    scope: ProfileScope,
    state: Mutex<ProfileState>,
    fail_resets: AtomicBool,
}

impl MemoryProfileRepository {
    pub fn new(scope: ProfileScope) -> Self {
        Self {
            scope,
            state: Mutex::new(ProfileState::default()),
            fail_resets: AtomicBool::new(false),
        }
    }

    /// Makes `reset_daily_counts` fail until turned off again
    pub fn fail_resets(&self, fail: bool) {
        self.fail_resets.store(fail, Ordering::SeqCst);
    }

    /// Inserts a ready-made profile, bypassing proxy assignment
    pub fn insert(&self, profile: Profile) {
        self.state.lock().unwrap().profiles.push(profile);
    }

    /// Builds an active profile on this scope's machine
    pub fn profile(&self, name: &str) -> Profile {
        let now = Utc::now();
        Profile {
            name: name.to_string(),
            proxy: format!("http://proxy-{}:8000", name),
            session_dir: self.scope.session_dir(name),
            fingerprint: None,
            machine_id: self.scope.machine_id.clone(),
            status: ProfileStatus::Active,
            credit_remaining: None,
            daily_run_count: 0,
            last_run_at: None,
            last_credit_check_at: None,
            lease_holder: None,
            lease_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn with_profile<T>(&self, name: &str, f: impl FnOnce(&mut Profile) -> T) -> Result<T> {
        let mut state = self.state.lock().unwrap();
        let machine_id = &self.scope.machine_id;
        state
            .profiles
            .iter_mut()
            .find(|p| p.name == name && &p.machine_id == machine_id)
            .map(f)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", name)))
    }
}

#[async_trait]
impl ProfileRepository for MemoryProfileRepository {
    async fn seed_proxies(&self, addresses: &[String]) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        let mut inserted = 0;
        for address in addresses {
            if state.proxies.iter().any(|p| &p.address == address) {
                continue;
            }
            state.proxies.push(Proxy {
                address: address.clone(),
                profile_name: None,
                added_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_proxies(&self) -> Result<Vec<Proxy>> {
        Ok(self.state.lock().unwrap().proxies.clone())
    }

    async fn ensure_profile(&self, name: &str) -> Result<Profile> {
        let mut state = self.state.lock().unwrap();

        if let Some(existing) = state.profiles.iter().find(|p| p.name == name) {
            if existing.machine_id != self.scope.machine_id {
                return Err(StoreError::Conflict(format!("profile {}", name)));
            }
            return Ok(existing.clone());
        }

        let proxy = state
            .proxies
            .iter_mut()
            .find(|p| p.profile_name.is_none())
            .ok_or_else(|| StoreError::ResourceExhausted(format!("profile {}", name)))?;
        proxy.profile_name = Some(name.to_string());
        let address = proxy.address.clone();

        let mut profile = self.profile(name);
        profile.proxy = address;
        state.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn get_profile(&self, name: &str) -> Result<Option<Profile>> {
        let state = self.state.lock().unwrap();
        Ok(state.profiles.iter().find(|p| p.name == name).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .profiles
            .iter()
            .filter(|p| p.machine_id == self.scope.machine_id)
            .cloned()
            .collect())
    }

    async fn select_available_profile(
        &self,
        excluding: &[String],
        lease: &LeaseRequest,
    ) -> Result<Option<Profile>> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();

        let chosen = state
            .profiles
            .iter_mut()
            .filter(|p| p.machine_id == self.scope.machine_id)
            .filter(|p| p.is_eligible(self.scope.min_credit, now))
            .filter(|p| !excluding.contains(&p.name))
            .min_by_key(|p| (p.last_run_at.is_some(), p.last_run_at, p.created_at));

        Ok(chosen.map(|profile| {
            profile.last_run_at = Some(now);
            profile.lease_holder = Some(lease.holder.clone());
            profile.lease_expires_at = Some(lease.expires_at(now));
            profile.updated_at = now;
            profile.clone()
        }))
    }

    async fn release_profile(&self, name: &str, holder: &str) -> Result<bool> {
        self.with_profile(name, |p| {
            if p.lease_holder.as_deref() != Some(holder) {
                return false;
            }
            p.lease_holder = None;
            p.lease_expires_at = None;
            true
        })
    }

    async fn update_credit(&self, name: &str, remaining: i32) -> Result<()> {
        let min_credit = self.scope.min_credit;
        self.with_profile(name, |p| {
            p.credit_remaining = Some(remaining);
            p.status = p.status.after_credit_check(remaining, min_credit);
            p.last_credit_check_at = Some(Utc::now());
        })
    }

    async fn increment_run_count(&self, name: &str) -> Result<()> {
        self.with_profile(name, |p| p.daily_run_count += 1)
    }

    async fn reset_daily_counts(&self) -> Result<u64> {
        if self.fail_resets.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut state = self.state.lock().unwrap();
        let mut reset = 0;
        for p in state
            .profiles
            .iter_mut()
            .filter(|p| p.machine_id == self.scope.machine_id && p.daily_run_count != 0)
        {
            p.daily_run_count = 0;
            reset += 1;
        }
        Ok(reset)
    }

    async fn set_fingerprint(&self, name: &str, fingerprint: &str) -> Result<bool> {
        self.with_profile(name, |p| {
            if p.fingerprint.is_some() {
                return false;
            }
            p.fingerprint = Some(fingerprint.to_string());
            true
        })
    }

    async fn set_status(&self, name: &str, status: ProfileStatus) -> Result<()> {
        self.with_profile(name, |p| p.status = status)
    }
}

#[derive(Default)]
pub struct MemoryTaskRepository {
    tasks: Mutex<HashMap<String, Task>>,
    stats: Mutex<HashMap<NaiveDate, DailyStats>>,
    /// Every status successfully written, in order, per task
    history: Mutex<Vec<(String, TaskStatus)>>,
}

impl MemoryTaskRepository {
    pub fn status_history(&self, task_id: &str) -> Vec<TaskStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == task_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn save_task(&self, task: &TaskRequest, product_code: &str) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&task.task_id) {
            return Ok(false);
        }
        tasks.insert(
            task.task_id.clone(),
            Task::claimed(task, product_code, Utc::now()),
        );
        self.history
            .lock()
            .unwrap()
            .push((task.task_id.clone(), TaskStatus::Claimed));
        Ok(true)
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        update: TaskUpdate,
    ) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(false);
        };
        let applied = task.apply_update(status, update, Utc::now());
        if applied {
            self.history
                .lock()
                .unwrap()
                .push((task_id.to_string(), status));
        }
        Ok(applied)
    }

    async fn increment_daily_stats(&self, outcome: TaskOutcome, video_count: i64) -> Result<()> {
        let date = today();
        self.stats
            .lock()
            .unwrap()
            .entry(date)
            .or_insert_with(|| DailyStats::empty(date))
            .record(outcome, video_count);
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(task_id).cloned())
    }

    async fn get_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>> {
        Ok(self.stats.lock().unwrap().get(&date).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn scope() -> ProfileScope {
        ProfileScope {
            machine_id: "m1".to_string(),
            min_credit: 3,
            profiles_dir: "/tmp/profiles".to_string(),
        }
    }

    fn lease(holder: &str) -> LeaseRequest {
        LeaseRequest {
            holder: holder.to_string(),
            ttl: chrono::Duration::minutes(30),
        }
    }

    #[tokio::test]
    async fn test_concurrent_selection_is_exclusive() {
        let repo = Arc::new(MemoryProfileRepository::new(scope()));
        repo.insert(repo.profile("only"));

        let mut handles = Vec::new();
        for i in 0..8 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.select_available_profile(&[], &lease(&format!("instance-{}", i)))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_never_run_profiles_are_selected_first() {
        let repo = MemoryProfileRepository::new(scope());
        let mut ran = repo.profile("ran");
        ran.last_run_at = Some(Utc::now() - chrono::Duration::hours(1));
        repo.insert(ran);
        repo.insert(repo.profile("fresh"));

        let picked = repo
            .select_available_profile(&[], &lease("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.name, "fresh");
    }

    #[tokio::test]
    async fn test_ensure_profile_exhausts_proxies() {
        let repo = MemoryProfileRepository::new(scope());
        repo.seed_proxies(&["http://1.1.1.1:80".to_string()])
            .await
            .unwrap();

        let first = repo.ensure_profile("p1").await.unwrap();
        assert_eq!(first.proxy, "http://1.1.1.1:80");
        assert_eq!(repo.ensure_profile("p1").await.unwrap().proxy, first.proxy);
        assert!(matches!(
            repo.ensure_profile("p2").await,
            Err(StoreError::ResourceExhausted(_))
        ));
    }
}

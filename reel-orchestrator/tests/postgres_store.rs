//! Postgres store tests
//!
//! Run against a scratch database named by `TEST_DATABASE_URL`; skipped when
//! it is unset. Every test works under its own machine id and task prefix so
//! runs do not interfere.

use reel_core::domain::profile::ProfileStatus;
use reel_core::domain::task::{TaskRequest, TaskStatus, TaskUpdate};
use reel_orchestrator::db::Database;
use reel_orchestrator::error::StoreError;
use reel_orchestrator::repository::{
    LeaseRequest, PgProfileRepository, PgTaskRepository, ProfileRepository, ProfileScope,
    TaskRepository,
};
use std::sync::Arc;

async fn database() -> Option<Database> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let db = Database::connect(&url).await.expect("connect to test database");
    db.migrate().await.expect("migrate test database");
    Some(db)
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

fn profiles(db: &Database, machine_id: &str) -> PgProfileRepository {
    PgProfileRepository::new(
        db.pool().clone(),
        ProfileScope {
            machine_id: machine_id.to_string(),
            min_credit: 3,
            profiles_dir: "/tmp/profiles".to_string(),
        },
    )
}

fn lease(holder: &str) -> LeaseRequest {
    LeaseRequest {
        holder: holder.to_string(),
        ttl: chrono::Duration::minutes(26),
    }
}

fn request(task_id: &str) -> TaskRequest {
    TaskRequest {
        task_id: task_id.to_string(),
        prompt: "a lighthouse at dusk".to_string(),
        image_urls: vec!["https://img/1.png".to_string()],
        duration: Some(15),
        resolution: Some("portrait".to_string()),
        width: None,
        height: None,
    }
}

#[tokio::test]
async fn test_selection_is_exclusive_across_instances() {
    let Some(db) = database().await else {
        return;
    };
    let machine = unique("machine");
    let repo = Arc::new(profiles(&db, &machine));

    repo.seed_proxies(&[unique("http://proxy")]).await.unwrap();
    let profile = repo.ensure_profile(&unique("profile")).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move {
            repo.select_available_profile(&[], &lease(&format!("instance-{}", i)))
                .await
                .unwrap()
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(p) = handle.await.unwrap() {
            winners.push(p);
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].name, profile.name);
    assert!(winners[0].last_run_at.is_some());

    let holder = winners[0].lease_holder.clone().unwrap();
    assert!(repo.release_profile(&profile.name, &holder).await.unwrap());
    assert!(
        repo.select_available_profile(&[], &lease("late"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_ensure_profile_is_idempotent_and_machine_scoped() {
    let Some(db) = database().await else {
        return;
    };
    let repo = profiles(&db, &unique("machine"));
    let proxy = unique("http://proxy");
    repo.seed_proxies(std::slice::from_ref(&proxy)).await.unwrap();

    // Re-seeding is a no-op
    assert_eq!(repo.seed_proxies(std::slice::from_ref(&proxy)).await.unwrap(), 0);

    let name = unique("profile");
    let first = repo.ensure_profile(&name).await.unwrap();
    let again = repo.ensure_profile(&name).await.unwrap();
    assert_eq!(first.proxy, again.proxy);

    let other_machine = profiles(&db, &unique("machine"));
    assert!(matches!(
        other_machine.ensure_profile(&name).await,
        Err(StoreError::Conflict(_))
    ));
}

#[tokio::test]
async fn test_credit_threshold_controls_eligibility() {
    let Some(db) = database().await else {
        return;
    };
    let repo = profiles(&db, &unique("machine"));
    repo.seed_proxies(&[unique("http://proxy")]).await.unwrap();
    let name = repo.ensure_profile(&unique("profile")).await.unwrap().name;

    repo.update_credit(&name, 2).await.unwrap();
    let profile = repo.get_profile(&name).await.unwrap().unwrap();
    assert_eq!(profile.status, ProfileStatus::LowCredit);
    assert!(profile.last_credit_check_at.is_some());
    assert!(
        repo.select_available_profile(&[], &lease("a"))
            .await
            .unwrap()
            .is_none()
    );

    repo.update_credit(&name, 3).await.unwrap();
    assert_eq!(
        repo.get_profile(&name).await.unwrap().unwrap().status,
        ProfileStatus::Active
    );

    assert!(repo.set_fingerprint(&name, "fp-1").await.unwrap());
    assert!(!repo.set_fingerprint(&name, "fp-2").await.unwrap());
    repo.increment_run_count(&name).await.unwrap();
    assert_eq!(
        repo.get_profile(&name).await.unwrap().unwrap().daily_run_count,
        1
    );
    assert!(repo.reset_daily_counts().await.unwrap() >= 1);
}

#[tokio::test]
async fn test_task_persistence_is_idempotent_and_monotonic() {
    let Some(db) = database().await else {
        return;
    };
    let repo = PgTaskRepository::new(db.pool().clone());
    let task_id = unique("task");

    assert!(repo.save_task(&request(&task_id), "video").await.unwrap());
    assert!(!repo.save_task(&request(&task_id), "video").await.unwrap());

    let processing = TaskUpdate::default().with_profile("alpha");
    assert!(
        repo.update_task_status(&task_id, TaskStatus::Processing, processing)
            .await
            .unwrap()
    );
    assert!(
        repo.update_task_status(
            &task_id,
            TaskStatus::Completed,
            TaskUpdate::default().with_result_url("https://x/1"),
        )
        .await
        .unwrap()
    );

    // Moving back is rejected and leaves the record alone
    assert!(
        !repo
            .update_task_status(&task_id, TaskStatus::Processing, TaskUpdate::default())
            .await
            .unwrap()
    );

    let task = repo.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.profile_name.as_deref(), Some("alpha"));
    assert_eq!(task.result_url.as_deref(), Some("https://x/1"));
    assert_eq!(task.image_urls, vec!["https://img/1.png".to_string()]);
    assert!(task.started_at.is_some());
    assert!(task.completed_at.is_some());
}

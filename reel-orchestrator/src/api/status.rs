//! Status API Handlers
//!
//! Read-only views of the running scheduler and the task store.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use reel_core::domain::stats::{DailyStats, today};
use reel_core::domain::task::Task;
use serde::Serialize;

use super::ApiState;
use super::error::{ApiError, ApiResult};
use crate::scheduler::SchedulerState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: SchedulerState,
    pub machine_id: String,
    pub active_workers: Vec<WorkerStatus>,
}

#[derive(Debug, Serialize)]
pub struct WorkerStatus {
    pub task_id: String,
    pub profile_name: String,
    pub started_at: DateTime<Utc>,
    pub age_secs: i64,
}

/// GET /status
pub async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let now = Utc::now();
    let active_workers = state
        .scheduler
        .active_workers()
        .into_iter()
        .map(|w| WorkerStatus {
            age_secs: w.age(now).num_seconds(),
            task_id: w.task_id,
            profile_name: w.profile_name,
            started_at: w.started_at,
        })
        .collect();

    Json(StatusResponse {
        state: state.scheduler.state(),
        machine_id: state.machine_id.clone(),
        active_workers,
    })
}

/// GET /stats/today
pub async fn get_today_stats(State(state): State<ApiState>) -> ApiResult<Json<DailyStats>> {
    let date = today();
    let stats = state
        .tasks
        .get_daily_stats(date)
        .await?
        .unwrap_or_else(|| DailyStats::empty(date));

    Ok(Json(stats))
}

/// GET /tasks/{id}
pub async fn get_task(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    state
        .tasks
        .get_task(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("task {} not found", id)))
}

//! API Module
//!
//! Optional HTTP status API for the orchestrator.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod health;
pub mod status;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::repository::TaskRepository;
use crate::scheduler::SchedulerHandle;

/// Shared state of the status handlers
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: SchedulerHandle,
    pub tasks: Arc<dyn TaskRepository>,
    pub machine_id: String,
}

/// Create the status router with all endpoints
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/status", get(status::get_status))
        .route("/stats/today", get(status::get_today_stats))
        .route("/tasks/{id}", get(status::get_task))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

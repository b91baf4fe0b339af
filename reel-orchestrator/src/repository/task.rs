//! Task Repository
//!
//! Handles all database operations related to task records and the daily
//! counters derived from them.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reel_core::domain::stats::{DailyStats, TaskOutcome, today};
use reel_core::domain::task::{Task, TaskRequest, TaskStatus, TaskUpdate};
use sqlx::PgPool;

use super::TaskRepository;
use crate::error::{Result, StoreError};

const TASK_COLUMNS: &str = "task_id, product_code, prompt, image_urls, duration, resolution, \
    width, height, status, profile_name, result_url, error_message, claimed_at, started_at, \
    completed_at, created_at, updated_at";

/// Postgres-backed task record store
#[derive(Debug, Clone)]
pub struct PgTaskRepository {
    pool: PgPool,
}

impl PgTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn save_task(&self, task: &TaskRequest, product_code: &str) -> Result<bool> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (task_id, product_code, prompt, image_urls, duration, resolution,
                               width, height, status, claimed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10, $10)
            ON CONFLICT (task_id) DO NOTHING
            "#,
        )
        .bind(&task.task_id)
        .bind(product_code)
        .bind(&task.prompt)
        .bind(&task.image_urls)
        .bind(task.duration)
        .bind(&task.resolution)
        .bind(task.width)
        .bind(task.height)
        .bind(TaskStatus::Claimed.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_task_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        update: TaskUpdate,
    ) -> Result<bool> {
        let now = Utc::now();
        let update = update.stamped(status, now);
        let predecessors: Vec<String> = TaskStatus::predecessors(status)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        // The status guard makes regressions a no-op instead of an overwrite
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                profile_name = COALESCE($3, profile_name),
                result_url = COALESCE($4, result_url),
                error_message = COALESCE($5, error_message),
                started_at = COALESCE($6, started_at),
                completed_at = COALESCE($7, completed_at),
                updated_at = $8
            WHERE task_id = $1 AND status = ANY($9)
            "#,
        )
        .bind(task_id)
        .bind(status.as_str())
        .bind(update.profile_name)
        .bind(update.result_url)
        .bind(update.error_message)
        .bind(update.started_at)
        .bind(update.completed_at)
        .bind(now)
        .bind(predecessors)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_daily_stats(&self, outcome: TaskOutcome, video_count: i64) -> Result<()> {
        let (completed, failed, videos) = match outcome {
            TaskOutcome::Completed => (1_i64, 0_i64, video_count),
            TaskOutcome::Failed => (0, 1, 0),
        };

        sqlx::query(
            r#"
            INSERT INTO daily_stats (date, total_tasks, completed_tasks, failed_tasks,
                                     total_videos, updated_at)
            VALUES ($1, 1, $2, $3, $4, $5)
            ON CONFLICT (date) DO UPDATE SET
                total_tasks = daily_stats.total_tasks + 1,
                completed_tasks = daily_stats.completed_tasks + EXCLUDED.completed_tasks,
                failed_tasks = daily_stats.failed_tasks + EXCLUDED.failed_tasks,
                total_videos = daily_stats.total_videos + EXCLUDED.total_videos,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(today())
        .bind(completed)
        .bind(failed)
        .bind(videos)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE task_id = $1", TASK_COLUMNS);
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn get_daily_stats(&self, date: NaiveDate) -> Result<Option<DailyStats>> {
        let row = sqlx::query_as::<_, DailyStatsRow>(
            r#"
            SELECT date, total_tasks, completed_tasks, failed_tasks, total_videos
            FROM daily_stats
            WHERE date = $1
            "#,
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TaskRow {
    task_id: String,
    product_code: String,
    prompt: String,
    image_urls: Vec<String>,
    duration: Option<i32>,
    resolution: Option<String>,
    width: Option<i32>,
    height: Option<i32>,
    status: String,
    profile_name: Option<String>,
    result_url: Option<String>,
    error_message: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let status = row
            .status
            .parse::<TaskStatus>()
            .map_err(|e| StoreError::Corrupt(format!("task {}: {}", row.task_id, e)))?;

        Ok(Task {
            task_id: row.task_id,
            product_code: row.product_code,
            prompt: row.prompt,
            image_urls: row.image_urls,
            duration: row.duration,
            resolution: row.resolution,
            width: row.width,
            height: row.height,
            status,
            profile_name: row.profile_name,
            result_url: row.result_url,
            error_message: row.error_message,
            claimed_at: row.claimed_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DailyStatsRow {
    date: NaiveDate,
    total_tasks: i64,
    completed_tasks: i64,
    failed_tasks: i64,
    total_videos: i64,
}

impl From<DailyStatsRow> for DailyStats {
    fn from(row: DailyStatsRow) -> Self {
        DailyStats {
            date: row.date,
            total_tasks: row.total_tasks,
            completed_tasks: row.completed_tasks,
            failed_tasks: row.failed_tasks,
            total_videos: row.total_videos,
        }
    }
}

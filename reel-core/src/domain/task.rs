//! Task domain types
//!
//! A task is one externally sourced request for a generated video. It enters
//! Reel when claimed from the task API and is recorded locally as an audit
//! trail; records are never deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Work item as claimed from the task source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_id: String,
    pub prompt: String,
    pub image_urls: Vec<String>,
    /// Requested clip length in seconds
    pub duration: Option<i32>,
    /// Free-form resolution hint ("portrait", "1280x720", ...)
    pub resolution: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

impl TaskRequest {
    /// Clip length the executor should generate for this request
    pub fn generation_duration(&self) -> GenerationDuration {
        GenerationDuration::from_hint(self.duration)
    }

    /// Orientation the executor should generate for this request
    pub fn orientation(&self) -> Orientation {
        Orientation::from_hints(self.resolution.as_deref(), self.width, self.height)
    }
}

/// Persisted task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub product_code: String,
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub duration: Option<i32>,
    pub resolution: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub status: TaskStatus,
    pub profile_name: Option<String>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Builds the record stored at claim time
    pub fn claimed(request: &TaskRequest, product_code: &str, now: DateTime<Utc>) -> Self {
        Self {
            task_id: request.task_id.clone(),
            product_code: product_code.to_string(),
            prompt: request.prompt.clone(),
            image_urls: request.image_urls.clone(),
            duration: request.duration,
            resolution: request.resolution.clone(),
            width: request.width,
            height: request.height,
            status: TaskStatus::Claimed,
            profile_name: None,
            result_url: None,
            error_message: None,
            claimed_at: Some(now),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges a status update into this record.
    ///
    /// Returns false and leaves the record untouched when the transition
    /// would move the status backwards.
    pub fn apply_update(&mut self, status: TaskStatus, update: TaskUpdate, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }

        let update = update.stamped(status, now);
        self.status = status;
        if update.profile_name.is_some() {
            self.profile_name = update.profile_name;
        }
        if update.result_url.is_some() {
            self.result_url = update.result_url;
        }
        if update.error_message.is_some() {
            self.error_message = update.error_message;
        }
        if update.started_at.is_some() {
            self.started_at = update.started_at;
        }
        if update.completed_at.is_some() {
            self.completed_at = update.completed_at;
        }
        self.updated_at = now;
        true
    }
}

/// Fields merged into a task record alongside a status change
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub profile_name: Option<String>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn with_profile(mut self, profile_name: impl Into<String>) -> Self {
        self.profile_name = Some(profile_name.into());
        self
    }

    pub fn with_result_url(mut self, url: impl Into<String>) -> Self {
        self.result_url = Some(url.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Fills in the timestamps implied by entering `status` unless the caller
    /// already supplied them.
    pub fn stamped(mut self, status: TaskStatus, now: DateTime<Utc>) -> Self {
        if status == TaskStatus::Processing && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self
    }
}

/// Task lifecycle status
///
/// Statuses only ever move forward:
/// pending → claimed → processing → {completed | failed | timeout}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Claimed,
    Processing,
    Completed,
    Failed,
    Timeout,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Claimed,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Claimed => 1,
            TaskStatus::Processing => 2,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 3
    }

    /// Returns true if a record in this status may move to `next`
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.rank() < next.rank()
    }

    /// Statuses a record may currently hold for a move to `next` to be legal
    pub fn predecessors(next: TaskStatus) -> Vec<TaskStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown task status '{}'", s))
    }
}

/// Clip length accepted by the generation executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationDuration {
    Short,
    Long,
}

impl GenerationDuration {
    pub fn seconds(&self) -> u32 {
        match self {
            GenerationDuration::Short => 10,
            GenerationDuration::Long => 15,
        }
    }

    /// Snaps a requested length to the nearest permitted value
    pub fn from_hint(seconds: Option<i32>) -> Self {
        match seconds {
            Some(s) if s > 10 => GenerationDuration::Long,
            _ => GenerationDuration::Short,
        }
    }
}

/// Frame orientation accepted by the generation executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }

    /// Derives orientation from the task hints.
    ///
    /// An explicit `portrait`/`landscape` resolution wins, then a `WxH`
    /// resolution string, then the width/height pair. Defaults to landscape.
    pub fn from_hints(resolution: Option<&str>, width: Option<i32>, height: Option<i32>) -> Self {
        if let Some(resolution) = resolution.map(|r| r.trim().to_ascii_lowercase()) {
            match resolution.as_str() {
                "portrait" | "vertical" => return Orientation::Portrait,
                "landscape" | "horizontal" => return Orientation::Landscape,
                _ => {}
            }
            if let Some((w, h)) = resolution.split_once('x') {
                if let (Ok(w), Ok(h)) = (w.trim().parse::<i32>(), h.trim().parse::<i32>()) {
                    return Self::from_dimensions(w, h);
                }
            }
        }

        match (width, height) {
            (Some(w), Some(h)) => Self::from_dimensions(w, h),
            _ => Orientation::Landscape,
        }
    }

    fn from_dimensions(width: i32, height: i32) -> Self {
        if height > width {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Daily aggregate statistics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Throughput and failure counters for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub failed_tasks: i64,
    pub total_videos: i64,
}

impl DailyStats {
    /// Zeroed counters for `date`
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            total_videos: 0,
        }
    }

    pub fn record(&mut self, outcome: TaskOutcome, video_count: i64) {
        self.total_tasks += 1;
        match outcome {
            TaskOutcome::Completed => {
                self.completed_tasks += 1;
                self.total_videos += video_count;
            }
            TaskOutcome::Failed => self.failed_tasks += 1,
        }
    }
}

/// How a task ended, as far as the counters care
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// Failures and timeouts alike
    Failed,
}

/// Local calendar date used to key daily counters
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

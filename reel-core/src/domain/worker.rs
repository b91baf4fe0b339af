//! Worker result types
//!
//! The generation executor reports its outcome as a single JSON object on
//! the last non-empty line of its output. [`ExecutorReport`] is that object;
//! [`WorkerResult`] is what the supervisor hands back to the scheduler after
//! folding in process-level failures (spawn errors, exit codes, timeouts).

use serde::{Deserialize, Serialize};

/// Terminal status line emitted by the generation executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorReport {
    pub success: bool,
    #[serde(default, alias = "public_url", skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, alias = "download_url", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, alias = "job_id", skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Credit balance read back after the generation
    #[serde(default, alias = "credits_remaining", skip_serializing_if = "Option::is_none")]
    pub credits_remaining: Option<i32>,
    /// Fingerprint negotiated for the browser session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl ExecutorReport {
    /// Parses the last non-empty line of `output` as a report.
    ///
    /// Only the final line is considered; earlier lines are diagnostics.
    pub fn from_final_line(output: &str) -> Option<Self> {
        let line = output.lines().map(str::trim).rfind(|l| !l.is_empty())?;
        serde_json::from_str(line).ok()
    }
}

/// Why a worker did not produce a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The executor process could not be started
    Spawn,
    /// The wall-clock limit fired and the process was killed
    Timeout,
    /// Non-zero exit without an error report
    Exited,
    /// Zero exit without a usable success report
    InvalidOutput,
    /// The executor reported a failure itself
    Reported,
}

/// Outcome of one supervised generation attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResult {
    pub success: bool,
    pub public_url: Option<String>,
    pub download_url: Option<String>,
    pub job_id: Option<String>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    pub credits_remaining: Option<i32>,
    pub fingerprint: Option<String>,
}

impl WorkerResult {
    /// Successful result carrying the report's URLs and side data
    pub fn succeeded(report: ExecutorReport) -> Self {
        Self {
            success: true,
            public_url: report.public_url,
            download_url: report.download_url,
            job_id: report.job_id,
            error: None,
            failure: None,
            credits_remaining: report.credits_remaining,
            fingerprint: report.fingerprint,
        }
    }

    pub fn failed(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            public_url: None,
            download_url: None,
            job_id: None,
            error: Some(error.into()),
            failure: Some(kind),
            credits_remaining: None,
            fingerprint: None,
        }
    }

    /// Failed result built from an executor-reported error.
    ///
    /// Keeps any credit reading the executor managed to take.
    pub fn reported(report: ExecutorReport) -> Self {
        let error = report
            .error
            .unwrap_or_else(|| "executor reported failure".to_string());
        Self {
            credits_remaining: report.credits_remaining,
            fingerprint: report.fingerprint,
            job_id: report.job_id,
            ..Self::failed(FailureKind::Reported, error)
        }
    }

    /// URL stored on the task: the public link, else the download link
    pub fn result_url(&self) -> Option<&str> {
        self.public_url.as_deref().or(self.download_url.as_deref())
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(FailureKind::Timeout)
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}

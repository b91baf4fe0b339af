//! Task API DTOs
//!
//! Every response from the task API is wrapped in an [`Envelope`]. A claim
//! returns the task in `data` with `error_code = 0`; the
//! [`NO_PENDING_TASKS`] code means the queue is empty.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::task::TaskRequest;

/// `error_code` of a successful response
pub const SUCCESS: i64 = 0;

/// `error_code` returned when no task is waiting for the product
pub const NO_PENDING_TASKS: i64 = 404;

/// Response wrapper used by every task API endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub error_code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.error_code == SUCCESS
    }

    pub fn is_empty_queue(&self) -> bool {
        self.error_code == NO_PENDING_TASKS
    }
}

/// Task as returned by `GET /tasks/{product_code}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTask {
    #[serde(alias = "task_id", deserialize_with = "string_or_number")]
    pub id: String,
    pub prompt: String,
    #[serde(default, alias = "image_urls", alias = "image_url")]
    pub images: ImageRefs,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
}

/// Image references; the API sends either a single URL or a list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRefs {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl ImageRefs {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ImageRefs::None => Vec::new(),
            ImageRefs::One(url) if url.is_empty() => Vec::new(),
            ImageRefs::One(url) => vec![url],
            ImageRefs::Many(urls) => urls.into_iter().filter(|u| !u.is_empty()).collect(),
        }
    }
}

impl From<RemoteTask> for TaskRequest {
    fn from(task: RemoteTask) -> Self {
        TaskRequest {
            task_id: task.id,
            prompt: task.prompt,
            image_urls: task.images.into_vec(),
            duration: task.duration,
            resolution: task.resolution,
            width: task.width,
            height: task.height,
        }
    }
}

/// Body of `PUT /tasks/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteTaskRequest {
    pub result_url: String,
}

/// Body of `PUT /tasks/{id}/report`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTaskRequest {
    pub reason: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected task id string or number, got {}",
            other
        ))),
    }
}

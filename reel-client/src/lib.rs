//! Reel Task API Client
//!
//! A small, typed HTTP client for the external task queue that feeds Reel
//! with video-generation requests.
//!
//! The client exposes two layers:
//! - `try_*` methods return [`Result`] and surface every failure
//! - the plain methods (`claim_task`, `complete_task`, `report_task`) never
//!   fail: errors are logged and folded into `None`/`false`, which is what the
//!   scheduler consumes
//!
//! # Example
//!
//! ```no_run
//! use reel_client::TaskSourceClient;
//!
//! # async fn example() {
//! let client = TaskSourceClient::new("https://tasks.example.com/api", "secret");
//!
//! if let Some(task) = client.claim_task("sora").await {
//!     println!("Claimed task {}", task.task_id);
//! }
//! # }
//! ```

pub mod error;
mod tasks;

pub use error::{ClientError, Result};

use reel_core::dto::task_source::Envelope;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Header carrying the static API key
pub const API_KEY_HEADER: &str = "X-API-Key";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the task API
#[derive(Debug, Clone)]
pub struct TaskSourceClient {
    /// Base URL of the task API (e.g., "https://tasks.example.com/api")
    base_url: String,
    /// Value sent in the API key header
    api_key: String,
    /// HTTP client instance
    client: Client,
}

impl TaskSourceClient {
    /// Create a new task API client with a 30 second request timeout
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the task API
    /// * `api_key` - Static key sent with every request
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(base_url, api_key, client)
    }

    /// Create a new task API client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Get the base URL of the task API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Read a response into an envelope
    ///
    /// The API reports most outcomes through `error_code`, sometimes alongside
    /// a non-2xx status, so the body is parsed first and the status is only
    /// used when the body is not an envelope.
    async fn handle_envelope<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Envelope<T>> {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => {
                Err(ClientError::api_error(status.as_u16(), body))
            }
            Err(e) => Err(ClientError::ParseError(format!(
                "Failed to parse envelope: {}",
                e
            ))),
        }
    }
}

//! Task API endpoints

use crate::error::{ClientError, Result};
use crate::{API_KEY_HEADER, TaskSourceClient};
use reel_core::domain::task::TaskRequest;
use reel_core::dto::task_source::{CompleteTaskRequest, Envelope, RemoteTask, ReportTaskRequest};
use tracing::{debug, info, warn};

impl TaskSourceClient {
    // =============================================================================
    // Claiming
    // =============================================================================

    /// Claim one pending task for `product_code`
    ///
    /// # Returns
    /// `Ok(None)` when the queue is empty, `Err` for every other failure
    pub async fn try_claim_task(&self, product_code: &str) -> Result<Option<TaskRequest>> {
        let url = format!("{}/tasks/{}", self.base_url, product_code);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let envelope: Envelope<RemoteTask> = self.handle_envelope(response).await?;

        if envelope.is_empty_queue() {
            debug!("No pending tasks for product {}", product_code);
            return Ok(None);
        }

        if !envelope.is_success() {
            return Err(ClientError::Rejected {
                code: envelope.error_code,
                message: envelope.message,
            });
        }

        match envelope.data {
            Some(task) => {
                let task: TaskRequest = task.into();
                info!("Claimed task {} for product {}", task.task_id, product_code);
                Ok(Some(task))
            }
            None => {
                warn!("Claim for product {} succeeded without a task", product_code);
                Ok(None)
            }
        }
    }

    /// Claim one pending task, folding every failure into `None`
    pub async fn claim_task(&self, product_code: &str) -> Option<TaskRequest> {
        match self.try_claim_task(product_code).await {
            Ok(task) => task,
            Err(e) => {
                warn!("Failed to claim task for product {}: {}", product_code, e);
                None
            }
        }
    }

    // =============================================================================
    // Acknowledgement
    // =============================================================================

    /// Report a task as completed with its result URL
    pub async fn try_complete_task(&self, task_id: &str, result_url: &str) -> Result<()> {
        let url = format!("{}/tasks/{}", self.base_url, task_id);
        let response = self
            .client
            .put(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&CompleteTaskRequest {
                result_url: result_url.to_string(),
            })
            .send()
            .await?;

        self.expect_success(response).await
    }

    /// Report a task as completed; returns false if the API did not accept it
    pub async fn complete_task(&self, task_id: &str, result_url: &str) -> bool {
        match self.try_complete_task(task_id, result_url).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to complete task {}: {}", task_id, e);
                false
            }
        }
    }

    /// Report a task as failed with a reason
    pub async fn try_report_task(&self, task_id: &str, reason: &str) -> Result<()> {
        let url = format!("{}/tasks/{}/report", self.base_url, task_id);
        let response = self
            .client
            .put(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&ReportTaskRequest {
                reason: reason.to_string(),
            })
            .send()
            .await?;

        self.expect_success(response).await
    }

    /// Report a task as failed; returns false if the API did not accept it
    pub async fn report_task(&self, task_id: &str, reason: &str) -> bool {
        match self.try_report_task(task_id, reason).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to report task {}: {}", task_id, e);
                false
            }
        }
    }

    async fn expect_success(&self, response: reqwest::Response) -> Result<()> {
        let envelope: Envelope<serde_json::Value> = self.handle_envelope(response).await?;
        if envelope.is_success() {
            Ok(())
        } else {
            Err(ClientError::Rejected {
                code: envelope.error_code,
                message: envelope.message,
            })
        }
    }
}

//! Task source seam
//!
//! The scheduler only sees presence or absence of work; transport failures
//! are folded away by the implementation.

use async_trait::async_trait;
use reel_client::TaskSourceClient;
use reel_core::domain::task::TaskRequest;

#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Claims one task, `None` when nothing could be claimed
    async fn claim_task(&self, product_code: &str) -> Option<TaskRequest>;

    /// Returns false if the source did not acknowledge the completion
    async fn complete_task(&self, task_id: &str, result_url: &str) -> bool;

    /// Returns false if the source did not acknowledge the failure
    async fn report_task(&self, task_id: &str, reason: &str) -> bool;
}

#[async_trait]
impl TaskSource for TaskSourceClient {
    async fn claim_task(&self, product_code: &str) -> Option<TaskRequest> {
        TaskSourceClient::claim_task(self, product_code).await
    }

    async fn complete_task(&self, task_id: &str, result_url: &str) -> bool {
        TaskSourceClient::complete_task(self, task_id, result_url).await
    }

    async fn report_task(&self, task_id: &str, reason: &str) -> bool {
        TaskSourceClient::report_task(self, task_id, reason).await
    }
}

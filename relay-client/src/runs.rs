//! Run-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use relay_core::domain::approval::{ApprovalDecision, ApprovalRecord};
use relay_core::domain::run::{Run, SourceRef};
use relay_core::dto::approval::SubmitApproval;
use relay_core::dto::run::{RunSummary, StartRun};
use relay_core::dto::trigger::{PushEvent, TriggerResponse};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Run Lifecycle
    // =============================================================================

    /// Start a new run for a source reference
    pub async fn start_run(&self, source_ref: SourceRef) -> Result<Run> {
        let response = self
            .client
            .post(self.url("/run/start"))
            .json(&StartRun { source_ref })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Deliver a push notification, as the source repository webhook would
    pub async fn push(&self, event: PushEvent) -> Result<TriggerResponse> {
        let response = self
            .client
            .post(self.url("/webhook"))
            .json(&event)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List all runs, most recent first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let response = self.client.get(self.url("/run/list")).send().await?;

        self.handle_response(response).await
    }

    /// Get a run by ID
    pub async fn get_run(&self, run_id: Uuid) -> Result<Run> {
        let response = self
            .client
            .get(self.url(&format!("/run/{}", run_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a running run
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<Run> {
        let response = self
            .client
            .post(self.url(&format!("/run/{}/cancel", run_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Retry the failed stage of a run from its start
    pub async fn retry_run(&self, run_id: Uuid) -> Result<Run> {
        let response = self
            .client
            .post(self.url(&format!("/run/{}/retry", run_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Approvals
    // =============================================================================

    /// Record a decision for a run paused at an approval gate
    ///
    /// A second decision for the same stage is rejected with a conflict.
    pub async fn submit_approval(
        &self,
        run_id: Uuid,
        stage: &str,
        decision: ApprovalDecision,
        comment: impl Into<String>,
    ) -> Result<ApprovalRecord> {
        let response = self
            .client
            .post(self.url(&format!("/run/{}/approval", run_id)))
            .json(&SubmitApproval {
                stage: stage.to_string(),
                decision,
                comment: comment.into(),
            })
            .send()
            .await?;

        self.handle_response(response).await
    }
}

//! Deployment-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use relay_core::domain::deployment::{Deployment, Environment, EnvironmentAlias};
use relay_core::domain::hook::HookStatus;
use relay_core::dto::hook::ReportHookStatus;
use uuid::Uuid;

impl OrchestratorClient {
    /// Get a deployment by ID
    pub async fn get_deployment(&self, deployment_id: Uuid) -> Result<Deployment> {
        let response = self
            .client
            .get(self.url(&format!("/deployment/{}", deployment_id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get the traffic routing of an environment
    pub async fn get_environment(&self, environment: Environment) -> Result<EnvironmentAlias> {
        let response = self
            .client
            .get(self.url(&format!("/environment/{}", environment)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Report the terminal status of a lifecycle hook execution
    ///
    /// The controller accepts exactly one report per hook execution.
    pub async fn report_hook_status(
        &self,
        deployment_id: Uuid,
        hook_execution_id: Uuid,
        status: HookStatus,
    ) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!(
                "/deployment/{}/hook/{}",
                deployment_id, hook_execution_id
            )))
            .json(&ReportHookStatus { status })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}

//! Hook status reporting

use async_trait::async_trait;
use relay_client::OrchestratorClient;
use relay_core::domain::hook::HookStatus;
use uuid::Uuid;

use crate::error::{HookError, Result};

/// Delivers the hook's single status report to the traffic-shift controller
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(
        &self,
        deployment_id: Uuid,
        hook_execution_id: Uuid,
        status: HookStatus,
    ) -> Result<()>;
}

/// Reports through the orchestrator HTTP API
pub struct OrchestratorReporter {
    client: OrchestratorClient,
}

impl OrchestratorReporter {
    pub fn new(client: OrchestratorClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusReporter for OrchestratorReporter {
    async fn report(
        &self,
        deployment_id: Uuid,
        hook_execution_id: Uuid,
        status: HookStatus,
    ) -> Result<()> {
        self.client
            .report_hook_status(deployment_id, hook_execution_id, status)
            .await
            .map_err(|e| HookError::Report(e.to_string()))
    }
}

//! Revision provisioning
//!
//! Creates or updates an environment's infrastructure so that it references a
//! new artifact. Provisioning never moves traffic; the controller does.

use async_trait::async_trait;
use relay_core::domain::deployment::Environment;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::process::{self, ProcessError};

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("provisioning exited with {exit_code:?}: {message}")]
    Failed {
        exit_code: Option<i32>,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub deployment_id: Uuid,
    pub revision_id: Uuid,
    pub environment: Environment,
    pub stack_name: String,
    pub artifacts_path: String,
    /// Resolved action environment
    pub env: BTreeMap<String, String>,
}

/// Result of a successful provisioning
#[derive(Debug, Clone, Default)]
pub struct ProvisionedRevision {
    /// Direct address of the new revision, if the procedure exported one
    pub url: Option<String>,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionedRevision, ProvisionError>;
}

/// Runs the configured deploy command once per deployment
pub struct CommandProvisioner {
    command: String,
    workspace_root: PathBuf,
}

impl CommandProvisioner {
    pub fn new(command: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            workspace_root: workspace_root.into(),
        }
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionedRevision, ProvisionError> {
        let mut env = request.env.clone();
        env.insert("STACK_NAME".to_string(), request.stack_name.clone());
        env.insert(
            "ENVIRONMENT".to_string(),
            request.environment.as_str().to_string(),
        );
        env.insert("ARTIFACTS_PATH".to_string(), request.artifacts_path.clone());
        env.insert("DEPLOYMENT_ID".to_string(), request.deployment_id.to_string());
        env.insert("REVISION_ID".to_string(), request.revision_id.to_string());

        let workdir = self
            .workspace_root
            .join("deployments")
            .join(request.deployment_id.to_string());

        let outcome = process::run_shell(&self.command, &env, &workdir).await?;
        if !outcome.success() {
            return Err(ProvisionError::Failed {
                exit_code: outcome.exit_code,
                message: outcome.stderr_tail().to_string(),
            });
        }

        Ok(ProvisionedRevision {
            url: outcome.exports.get("REVISION_URL").cloned(),
        })
    }
}

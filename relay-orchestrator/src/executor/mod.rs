//! Action Executors
//!
//! One executor per action kind. The engine hands each executor a fully
//! resolved context (inputs, environment, approvals of the stage) and records
//! whatever it returns into the run.

pub mod build;
pub mod deploy;
pub mod source;

pub use build::BuildExecutor;
pub use deploy::DeployExecutor;
pub use source::SourceExecutor;

use async_trait::async_trait;
use relay_core::domain::approval::ApprovalRecord;
use relay_core::domain::artifact::ArtifactRef;
use relay_core::domain::pipeline::ActionDefinition;
use relay_core::domain::run::{FailureKind, SourceRef};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::artifact::ArtifactError;
use crate::process::ProcessError;

/// Everything an executor needs to run one action
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub run_id: Uuid,
    pub stage: String,
    pub action: ActionDefinition,
    pub source_ref: SourceRef,
    /// Declared environment with variable references resolved
    pub env: BTreeMap<String, String>,
    /// Input artifacts, in declaration order
    pub inputs: Vec<ArtifactRef>,
    /// Approval decisions already recorded for the stage
    pub approvals: Vec<ApprovalRecord>,
}

/// What an action produced
#[derive(Debug, Clone, Default)]
pub struct ActionOutput {
    pub artifacts: Vec<ArtifactRef>,
    /// Exported under the action's variable namespace, if it declares one
    pub variables: BTreeMap<String, String>,
    pub deployment_id: Option<Uuid>,
    pub approval: Option<ApprovalRecord>,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("source capture failed: {0}")]
    Source(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("provisioning failed: {message}")]
    Provisioning {
        deployment_id: Option<Uuid>,
        message: String,
    },

    #[error("pre-traffic validation failed for deployment {deployment_id}: {message}")]
    Validation { deployment_id: Uuid, message: String },

    #[error("stage '{}' was rejected: {}", .0.stage, .0.comment)]
    ApprovalRejected(ApprovalRecord),

    #[error("{0}")]
    Contract(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("action was cancelled")]
    Cancelled,
}

impl ExecutorError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutorError::Source(_) => FailureKind::Source,
            ExecutorError::Build(_) | ExecutorError::Process(_) => FailureKind::Build,
            ExecutorError::Provisioning { .. } => FailureKind::Provisioning,
            ExecutorError::Validation { .. } => FailureKind::Validation,
            ExecutorError::ApprovalRejected(_) => FailureKind::ApprovalRejected,
            ExecutorError::Contract(_) => FailureKind::Contract,
            ExecutorError::Artifact(_) | ExecutorError::Cancelled => FailureKind::Internal,
        }
    }

    /// Deployment created before the failure, if any
    pub fn deployment_id(&self) -> Option<Uuid> {
        match self {
            ExecutorError::Provisioning { deployment_id, .. } => *deployment_id,
            ExecutorError::Validation { deployment_id, .. } => Some(*deployment_id),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutput, ExecutorError>;
}

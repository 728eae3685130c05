//! Run domain types
//!
//! A run is one execution of the pipeline. It owns everything produced along
//! the way: artifacts, exported variable namespaces and approval decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::approval::ApprovalRecord;
use crate::domain::artifact::ArtifactRef;
use crate::domain::pipeline::{ActionDefinition, PipelineDefinition};
use crate::domain::variables::VariableNamespace;

/// Reference to the change that triggered a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub branch: String,
    #[serde(default)]
    pub commit: Option<String>,
}

/// One execution of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline: String,
    pub source_ref: SourceRef,
    pub status: RunStatus,
    pub current_stage: Option<String>,
    pub stages: Vec<StageExecution>,
    /// Published artifacts keyed by logical artifact name
    pub artifacts: BTreeMap<String, ArtifactRef>,
    /// Exported variable namespaces keyed by namespace name
    pub variables: BTreeMap<String, VariableNamespace>,
    pub approvals: Vec<ApprovalRecord>,
    pub failure: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    /// Creates a new run with every stage pending
    pub fn new(definition: &PipelineDefinition, source_ref: SourceRef) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            pipeline: definition.name.clone(),
            source_ref,
            status: RunStatus::Running,
            current_stage: None,
            stages: definition
                .stages
                .iter()
                .map(|stage| StageExecution {
                    name: stage.name.clone(),
                    status: StageStatus::Pending,
                    actions: stage.actions.iter().map(ActionExecution::pending).collect(),
                    started_at: None,
                    completed_at: None,
                })
                .collect(),
            artifacts: BTreeMap::new(),
            variables: BTreeMap::new(),
            approvals: Vec::new(),
            failure: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageExecution> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_mut(&mut self, name: &str) -> Option<&mut StageExecution> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// Approval decisions recorded for a stage
    pub fn approvals_for(&self, stage: &str) -> Vec<ApprovalRecord> {
        self.approvals
            .iter()
            .filter(|a| a.stage == stage)
            .cloned()
            .collect()
    }

    /// Index of the stage that failed, if any
    pub fn failed_stage_index(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.status == StageStatus::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "Running"),
            RunStatus::Succeeded => write!(f, "Succeeded"),
            RunStatus::Failed => write!(f, "Failed"),
            RunStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Execution record of a single stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    pub name: String,
    pub status: StageStatus,
    pub actions: Vec<ActionExecution>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageExecution {
    pub fn action_mut(&mut self, name: &str) -> Option<&mut ActionExecution> {
        self.actions.iter_mut().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

/// Execution record of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionExecution {
    pub name: String,
    pub run_order: u32,
    pub status: ActionStatus,
    /// Names of artifacts this action published
    pub outputs: Vec<String>,
    pub deployment_id: Option<Uuid>,
    pub error: Option<String>,
    /// Number of times the action has been dispatched
    pub attempt: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ActionExecution {
    pub fn pending(definition: &ActionDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            run_order: definition.run_order,
            status: ActionStatus::Pending,
            outputs: Vec::new(),
            deployment_id: None,
            error: None,
            attempt: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Clears everything recorded by a previous attempt
    pub fn reset(&mut self) {
        self.status = ActionStatus::Pending;
        self.outputs.clear();
        self.deployment_id = None;
        self.error = None;
        self.started_at = None;
        self.completed_at = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
}

/// The stage and action responsible for a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub stage: String,
    pub action: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Failure taxonomy surfaced to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Source capture failed or the branch does not match
    Source,
    /// Build procedure exited non-success
    Build,
    /// Target environment update failed before a revision existed
    Provisioning,
    /// Pre-traffic validation failed or never reported
    Validation,
    /// An explicit reject decision was recorded
    ApprovalRejected,
    /// Action inputs or declared variables did not satisfy its contract
    Contract,
    /// Artifact store or other infrastructure failure
    Internal,
}

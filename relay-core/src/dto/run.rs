//! Run DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{Run, RunFailure, RunStatus, SourceRef};

/// Request to start a new run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRun {
    pub source_ref: SourceRef,
}

/// Summary information about a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub pipeline: String,
    pub branch: String,
    pub status: RunStatus,
    pub current_stage: Option<String>,
    pub failure: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Run> for RunSummary {
    fn from(run: Run) -> Self {
        Self {
            id: run.id,
            pipeline: run.pipeline,
            branch: run.source_ref.branch,
            status: run.status,
            current_stage: run.current_stage,
            failure: run.failure,
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

//! Lifecycle hook domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status a hook may report; the set is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookStatus {
    Succeeded,
    Failed,
}

impl std::fmt::Display for HookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookStatus::Succeeded => write!(f, "Succeeded"),
            HookStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// State of a single hook execution as tracked by the traffic-shift controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookExecutionStatus {
    Pending,
    Succeeded,
    Failed,
}

impl From<HookStatus> for HookExecutionStatus {
    fn from(status: HookStatus) -> Self {
        match status {
            HookStatus::Succeeded => HookExecutionStatus::Succeeded,
            HookStatus::Failed => HookExecutionStatus::Failed,
        }
    }
}

/// One invocation of the pre-traffic validation hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleHookExecution {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub status: HookExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub reported_at: Option<DateTime<Utc>>,
    /// Set when the controller gave up waiting for a report
    pub timed_out: bool,
}

impl LifecycleHookExecution {
    pub fn new(deployment_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            deployment_id,
            status: HookExecutionStatus::Pending,
            started_at: Utc::now(),
            reported_at: None,
            timed_out: false,
        }
    }
}

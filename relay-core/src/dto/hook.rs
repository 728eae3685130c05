//! Lifecycle hook DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::hook::HookStatus;

/// Event handed to the pre-traffic hook when it is invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEvent {
    pub deployment_id: Uuid,
    pub hook_execution_id: Uuid,
    /// Direct address of the revision under validation
    pub revision_url: Option<String>,
}

/// Status report from the hook to the traffic-shift controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportHookStatus {
    pub status: HookStatus,
}

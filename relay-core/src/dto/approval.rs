//! Approval DTOs

use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalDecision;

/// Decision submitted for a run paused at an approval gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitApproval {
    pub stage: String,
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub comment: String,
}

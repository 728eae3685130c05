//! Approval domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A human decision recorded at an approval gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalDecision::Approved => write!(f, "Approved"),
            ApprovalDecision::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Terminal record of an approval decision for one stage of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub run_id: Uuid,
    pub stage: String,
    pub action: String,
    pub decision: ApprovalDecision,
    pub comment: String,
    pub decided_at: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn is_approved(&self) -> bool {
        self.decision == ApprovalDecision::Approved
    }
}

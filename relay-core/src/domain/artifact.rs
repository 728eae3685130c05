//! Artifact domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to an immutable, versioned blob in the artifact store
///
/// Artifacts are keyed by run, so no two runs ever share a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub run_id: Uuid,
    pub name: String,
    pub version: u32,
    /// Store-specific location (e.g. a file path or bucket key)
    pub location: String,
    /// Hex-encoded SHA-256 of the content
    pub digest: String,
    pub size: u64,
    /// Stage and action that published the artifact
    pub stage: String,
    pub produced_by: String,
    pub created_at: DateTime<Utc>,
}

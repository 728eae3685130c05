//! Deployment domain model
//!
//! A deployment associates a target environment with an artifact and the
//! revision created from it. Traffic moves to the revision only after its
//! pre-traffic hook reports success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::hook::LifecycleHookExecution;

/// Target environment of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Whether a deploy action needs a prior Approved record in its stage
    pub fn requires_approval(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(format!(
                "unknown environment '{}', expected staging or production",
                other
            )),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A deployed, addressable version of the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub id: Uuid,
    pub environment: Environment,
    pub stack_name: String,
    pub artifacts_path: String,
    /// Direct address of this revision, bypassing the environment alias
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentState {
    Provisioning,
    ValidationPending,
    Live,
    RolledBack,
    Failed,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Live | DeploymentState::RolledBack | DeploymentState::Failed
        )
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentState::Provisioning => "Provisioning",
            DeploymentState::ValidationPending => "ValidationPending",
            DeploymentState::Live => "Live",
            DeploymentState::RolledBack => "RolledBack",
            DeploymentState::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub run_id: Uuid,
    pub environment: Environment,
    pub stack_name: String,
    pub artifacts_path: String,
    pub state: DeploymentState,
    pub revision: Option<Revision>,
    /// Revision that was live when this deployment started
    pub previous_revision: Option<Uuid>,
    pub hook_execution: Option<LifecycleHookExecution>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Traffic routing of one environment
///
/// While a shift is in progress `candidate` receives `candidate_weight`
/// percent of traffic and `live` the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentAlias {
    pub environment: Environment,
    pub live: Option<Revision>,
    pub previous: Option<Revision>,
    pub candidate: Option<Revision>,
    pub candidate_weight: u8,
    pub updated_at: DateTime<Utc>,
}

impl EnvironmentAlias {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            live: None,
            previous: None,
            candidate: None,
            candidate_weight: 0,
            updated_at: Utc::now(),
        }
    }
}

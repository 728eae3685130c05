//! Pipeline definition types
//!
//! A pipeline is an ordered list of stages; each stage holds actions grouped
//! by run order. Definitions are plain data: the orchestrator validates and
//! executes them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declarative pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<StageDefinition>,
}

/// A named, ordered phase of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub actions: Vec<ActionDefinition>,
}

impl StageDefinition {
    /// Groups the stage's actions by run order, lowest first
    pub fn run_order_groups(&self) -> BTreeMap<u32, Vec<&ActionDefinition>> {
        let mut groups: BTreeMap<u32, Vec<&ActionDefinition>> = BTreeMap::new();
        for action in &self.actions {
            groups.entry(action.run_order).or_default().push(action);
        }
        groups
    }
}

/// A unit of work within a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub kind: ActionKind,
    #[serde(default = "default_run_order")]
    pub run_order: u32,
    /// Names of artifacts consumed by this action
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Names of artifacts produced by this action
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
    /// Namespace under which the action's output variables are exported
    #[serde(default)]
    pub variables_namespace: Option<String>,
}

fn default_run_order() -> u32 {
    1
}

/// What an action does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Captures the triggering change for a configured branch
    Source { branch: String },
    /// Runs the external build procedure
    Build,
    /// Deploys to the environment named by the `ENVIRONMENT` variable
    Deploy,
    /// Suspends the stage until a human decision is recorded
    Approval {
        #[serde(default)]
        additional_information: Option<String>,
    },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Source { .. } => "source",
            ActionKind::Build => "build",
            ActionKind::Deploy => "deploy",
            ActionKind::Approval { .. } => "approval",
        }
    }
}

/// Value of a declared environment variable
///
/// Serialized as a plain string; `#{Namespace.KEY}` denotes a reference to a
/// variable exported by an upstream action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnvValue {
    Literal(String),
    Variable { namespace: String, key: String },
}

impl EnvValue {
    pub fn literal(value: impl Into<String>) -> Self {
        EnvValue::Literal(value.into())
    }

    pub fn variable(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        EnvValue::Variable {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl TryFrom<String> for EnvValue {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let Some(inner) = raw.strip_prefix("#{").and_then(|s| s.strip_suffix('}')) else {
            return Ok(EnvValue::Literal(raw));
        };

        match inner.split_once('.') {
            Some((namespace, key)) if !namespace.is_empty() && !key.is_empty() => {
                Ok(EnvValue::variable(namespace, key))
            }
            _ => Err(format!(
                "invalid variable reference '{}', expected #{{Namespace.KEY}}",
                raw
            )),
        }
    }
}

impl From<EnvValue> for String {
    fn from(value: EnvValue) -> Self {
        value.to_string()
    }
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Literal(value) => write!(f, "{}", value),
            EnvValue::Variable { namespace, key } => write!(f, "#{{{}.{}}}", namespace, key),
        }
    }
}

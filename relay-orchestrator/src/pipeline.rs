//! Pipeline definition loading and validation
//!
//! The built-in definition releases the customers API:
//! Source → Build → Staging → Production (manual review, then deploy).

use relay_core::domain::deployment::Environment;
use relay_core::domain::pipeline::{
    ActionDefinition, ActionKind, EnvValue, PipelineDefinition, StageDefinition,
};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::config::Config;

/// Variables every deploy action must declare
pub const DEPLOY_CONTRACT: [&str; 3] = ["STACK_NAME", "ENVIRONMENT", "ARTIFACTS_PATH"];

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read pipeline file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse pipeline file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid pipeline: {0}")]
    Invalid(String),
}

fn invalid(message: impl Into<String>) -> DefinitionError {
    DefinitionError::Invalid(message.into())
}

/// Loads the configured pipeline definition and validates it
pub fn load(config: &Config) -> Result<PipelineDefinition, DefinitionError> {
    let definition = match &config.pipeline_file {
        Some(path) => from_file(path)?,
        None => default_pipeline(&config.trigger_branch, &config.api_artifact_bucket),
    };

    validate(&definition)?;
    Ok(definition)
}

fn from_file(path: &Path) -> Result<PipelineDefinition, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// The built-in customers API release pipeline
pub fn default_pipeline(trigger_branch: &str, artifact_bucket: &str) -> PipelineDefinition {
    let deploy = |stack: &str, environment: &str, run_order: u32, namespace: Option<&str>| {
        ActionDefinition {
            name: "Deploy".to_string(),
            kind: ActionKind::Deploy,
            run_order,
            inputs: vec!["SourceArtifact".to_string()],
            outputs: vec![],
            env: BTreeMap::from([
                ("STACK_NAME".to_string(), EnvValue::literal(stack)),
                ("ENVIRONMENT".to_string(), EnvValue::literal(environment)),
                (
                    "ARTIFACTS_PATH".to_string(),
                    EnvValue::variable("BuildVariables", "ARTIFACTS_PATH"),
                ),
            ]),
            variables_namespace: namespace.map(str::to_string),
        }
    };

    PipelineDefinition {
        name: "CustomersApi".to_string(),
        stages: vec![
            StageDefinition {
                name: "Source".to_string(),
                actions: vec![ActionDefinition {
                    name: "Source".to_string(),
                    kind: ActionKind::Source {
                        branch: trigger_branch.to_string(),
                    },
                    run_order: 1,
                    inputs: vec![],
                    outputs: vec!["SourceArtifact".to_string()],
                    env: BTreeMap::new(),
                    variables_namespace: Some("SourceVariables".to_string()),
                }],
            },
            StageDefinition {
                name: "Build".to_string(),
                actions: vec![ActionDefinition {
                    name: "Build".to_string(),
                    kind: ActionKind::Build,
                    run_order: 1,
                    inputs: vec!["SourceArtifact".to_string()],
                    outputs: vec!["BuildArtifact".to_string()],
                    env: BTreeMap::from([
                        ("S3_BUCKET".to_string(), EnvValue::literal(artifact_bucket)),
                        (
                            "GIT_BRANCH".to_string(),
                            EnvValue::variable("SourceVariables", "BranchName"),
                        ),
                    ]),
                    variables_namespace: Some("BuildVariables".to_string()),
                }],
            },
            StageDefinition {
                name: "Staging".to_string(),
                actions: vec![deploy(
                    "CustomersApiStaging",
                    "staging",
                    1,
                    Some("StagingVariables"),
                )],
            },
            StageDefinition {
                name: "Production".to_string(),
                actions: vec![
                    ActionDefinition {
                        name: "Review".to_string(),
                        kind: ActionKind::Approval {
                            additional_information: Some(
                                "Ensure Customers API works correctly in Staging and release date is agreed with Product Owners"
                                    .to_string(),
                            ),
                        },
                        run_order: 1,
                        inputs: vec![],
                        outputs: vec![],
                        env: BTreeMap::new(),
                        variables_namespace: None,
                    },
                    deploy("CustomersApiProduction", "production", 2, None),
                ],
            },
        ],
    }
}

/// Checks the structural rules of a definition
///
/// Artifacts and variable namespaces must be produced before they are
/// consumed: by an earlier stage, or by a strictly lower run order of the
/// same stage.
pub fn validate(definition: &PipelineDefinition) -> Result<(), DefinitionError> {
    if definition.name.trim().is_empty() {
        return Err(invalid("pipeline name cannot be empty"));
    }

    if definition.stages.is_empty() {
        return Err(invalid("pipeline must declare at least one stage"));
    }

    let mut stage_names = HashSet::new();
    let mut artifacts: HashSet<&str> = HashSet::new();
    let mut namespaces: HashSet<&str> = HashSet::new();

    for stage in &definition.stages {
        if !stage_names.insert(stage.name.as_str()) {
            return Err(invalid(format!("duplicate stage '{}'", stage.name)));
        }

        if stage.actions.is_empty() {
            return Err(invalid(format!("stage '{}' has no actions", stage.name)));
        }

        let mut action_names = HashSet::new();
        for action in &stage.actions {
            if !action_names.insert(action.name.as_str()) {
                return Err(invalid(format!(
                    "duplicate action '{}' in stage '{}'",
                    action.name, stage.name
                )));
            }
            if action.run_order == 0 {
                return Err(invalid(format!(
                    "action '{}.{}' must have a run order of at least 1",
                    stage.name, action.name
                )));
            }
        }

        for (run_order, group) in stage.run_order_groups() {
            for action in &group {
                validate_action(stage, action, run_order, &artifacts, &namespaces)?;
            }

            for action in group {
                for output in &action.outputs {
                    if !artifacts.insert(output.as_str()) {
                        return Err(invalid(format!(
                            "artifact '{}' is produced more than once",
                            output
                        )));
                    }
                }
                if let Some(namespace) = &action.variables_namespace {
                    if !namespaces.insert(namespace.as_str()) {
                        return Err(invalid(format!(
                            "variable namespace '{}' is declared more than once",
                            namespace
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

fn validate_action(
    stage: &StageDefinition,
    action: &ActionDefinition,
    run_order: u32,
    artifacts: &HashSet<&str>,
    namespaces: &HashSet<&str>,
) -> Result<(), DefinitionError> {
    let qualified = format!("{}.{}", stage.name, action.name);

    for input in &action.inputs {
        if !artifacts.contains(input.as_str()) {
            return Err(invalid(format!(
                "action '{}' consumes artifact '{}' before it is produced",
                qualified, input
            )));
        }
    }

    for value in action.env.values() {
        if let EnvValue::Variable { namespace, .. } = value {
            if !namespaces.contains(namespace.as_str()) {
                return Err(invalid(format!(
                    "action '{}' references namespace '{}' before it is exported",
                    qualified, namespace
                )));
            }
        }
    }

    match &action.kind {
        ActionKind::Approval { .. } if !action.outputs.is_empty() => Err(invalid(format!(
            "approval action '{}' cannot produce artifacts",
            qualified
        ))),
        ActionKind::Deploy => {
            for key in DEPLOY_CONTRACT {
                if !action.env.contains_key(key) {
                    return Err(invalid(format!(
                        "deploy action '{}' must declare {}",
                        qualified, key
                    )));
                }
            }

            if let Some(EnvValue::Literal(environment)) = action.env.get("ENVIRONMENT") {
                let environment: Environment = environment.parse().map_err(invalid)?;
                let gated = stage.actions.iter().any(|other| {
                    matches!(other.kind, ActionKind::Approval { .. }) && other.run_order < run_order
                });
                if environment.requires_approval() && !gated {
                    return Err(invalid(format!(
                        "deploy action '{}' targets {} and needs an approval action earlier in its stage",
                        qualified, environment
                    )));
                }
            }

            Ok(())
        }
        _ => Ok(()),
    }
}

//! Deploy action
//!
//! Checks the environment contract and policy, then hands the deployment to
//! the traffic-shift controller and waits for its terminal state. Dropping
//! the wait (run cancellation) leaves the deployment running on the
//! controller.

use async_trait::async_trait;
use relay_core::domain::deployment::{DeploymentState, Environment};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::executor::{ActionContext, ActionExecutor, ActionOutput, ExecutorError};
use crate::pipeline::DEPLOY_CONTRACT;
use crate::traffic::{DeployRequest, TrafficController};

pub struct DeployExecutor {
    traffic: Arc<TrafficController>,
}

impl DeployExecutor {
    pub fn new(traffic: Arc<TrafficController>) -> Self {
        Self { traffic }
    }
}

/// Enforces the environment's approval policy for the action's stage
fn check_policy(ctx: &ActionContext, environment: Environment) -> Result<(), ExecutorError> {
    if !environment.requires_approval() {
        return Ok(());
    }

    if ctx.approvals.iter().any(|a| a.is_approved()) {
        return Ok(());
    }

    match ctx.approvals.iter().find(|a| !a.is_approved()) {
        Some(rejection) => Err(ExecutorError::ApprovalRejected(rejection.clone())),
        None => Err(ExecutorError::Contract(format!(
            "deploy to {} requires an Approved decision in stage '{}'",
            environment, ctx.stage
        ))),
    }
}

#[async_trait]
impl ActionExecutor for DeployExecutor {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutput, ExecutorError> {
        for key in DEPLOY_CONTRACT {
            if ctx.env.get(key).is_none_or(|v| v.trim().is_empty()) {
                return Err(ExecutorError::Contract(format!(
                    "deploy action '{}' is missing {}",
                    ctx.action.name, key
                )));
            }
        }

        let environment: Environment = ctx.env["ENVIRONMENT"]
            .parse()
            .map_err(ExecutorError::Contract)?;
        check_policy(&ctx, environment)?;

        let (deployment_id, mut state) = self.traffic.deploy(DeployRequest {
            run_id: ctx.run_id,
            environment,
            stack_name: ctx.env["STACK_NAME"].clone(),
            artifacts_path: ctx.env["ARTIFACTS_PATH"].clone(),
            env: ctx.env.clone(),
        });

        info!(
            "Run {} waiting on deployment {} to {}",
            ctx.run_id, deployment_id, environment
        );

        let deployment = state
            .wait_for(|d| d.state.is_terminal())
            .await
            .map(|d| d.clone())
            .map_err(|_| ExecutorError::Provisioning {
                deployment_id: Some(deployment_id),
                message: "traffic-shift controller dropped the deployment".to_string(),
            })?;

        let message = deployment.error.clone().unwrap_or_default();
        match deployment.state {
            DeploymentState::Live => {
                let mut variables = BTreeMap::from([
                    ("DEPLOYMENT_ID".to_string(), deployment_id.to_string()),
                    ("ENVIRONMENT".to_string(), environment.to_string()),
                ]);
                if let Some(revision) = &deployment.revision {
                    variables.insert("REVISION_ID".to_string(), revision.id.to_string());
                    if let Some(url) = &revision.url {
                        variables.insert("REVISION_URL".to_string(), url.clone());
                    }
                }

                Ok(ActionOutput {
                    variables,
                    deployment_id: Some(deployment_id),
                    ..Default::default()
                })
            }
            DeploymentState::RolledBack => Err(ExecutorError::Validation {
                deployment_id,
                message,
            }),
            _ => Err(ExecutorError::Provisioning {
                deployment_id: Some(deployment_id),
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traffic::testing::auto_reporting_controller;
    use chrono::Utc;
    use relay_core::domain::approval::{ApprovalDecision, ApprovalRecord};
    use relay_core::domain::hook::HookStatus;
    use relay_core::domain::pipeline::{ActionDefinition, ActionKind};
    use relay_core::domain::run::{FailureKind, SourceRef};
    use uuid::Uuid;

    fn context(environment: &str, approvals: Vec<ApprovalDecision>) -> ActionContext {
        let run_id = Uuid::new_v4();
        ActionContext {
            run_id,
            stage: "Production".to_string(),
            action: ActionDefinition {
                name: "Deploy".to_string(),
                kind: ActionKind::Deploy,
                run_order: 2,
                inputs: vec![],
                outputs: vec![],
                env: BTreeMap::new(),
                variables_namespace: None,
            },
            source_ref: SourceRef {
                branch: "main".to_string(),
                commit: None,
            },
            env: BTreeMap::from([
                ("STACK_NAME".to_string(), "CustomersApiProduction".to_string()),
                ("ENVIRONMENT".to_string(), environment.to_string()),
                ("ARTIFACTS_PATH".to_string(), "s3://bkt/A1".to_string()),
            ]),
            inputs: vec![],
            approvals: approvals
                .into_iter()
                .map(|decision| ApprovalRecord {
                    run_id,
                    stage: "Production".to_string(),
                    action: "Review".to_string(),
                    decision,
                    comment: String::new(),
                    decided_at: Utc::now(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_approved_production_deploy_goes_live() {
        let traffic = auto_reporting_controller(HookStatus::Succeeded);
        let executor = DeployExecutor::new(traffic.clone());

        let output = executor
            .execute(context("production", vec![ApprovalDecision::Approved]))
            .await
            .unwrap();

        let deployment_id = output.deployment_id.unwrap();
        assert_eq!(
            traffic.get_deployment(deployment_id).unwrap().state,
            DeploymentState::Live
        );
        assert_eq!(
            output.variables.get("DEPLOYMENT_ID").unwrap(),
            &deployment_id.to_string()
        );
        assert!(output.variables.contains_key("REVISION_URL"));
    }

    #[tokio::test]
    async fn test_production_deploy_without_approval_never_starts() {
        let traffic = auto_reporting_controller(HookStatus::Succeeded);
        let executor = DeployExecutor::new(traffic.clone());

        let err = executor.execute(context("production", vec![])).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Contract);

        let err = executor
            .execute(context("production", vec![ApprovalDecision::Rejected]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::ApprovalRejected);

        assert!(
            traffic
                .get_environment(Environment::Production)
                .live
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failed_hook_surfaces_validation_failure() {
        let traffic = auto_reporting_controller(HookStatus::Failed);
        let executor = DeployExecutor::new(traffic);

        let err = executor.execute(context("staging", vec![])).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Validation);
        assert!(err.deployment_id().is_some());
    }

    #[tokio::test]
    async fn test_contract_violations() {
        let executor = DeployExecutor::new(auto_reporting_controller(HookStatus::Succeeded));

        let mut ctx = context("staging", vec![]);
        ctx.env.remove("ARTIFACTS_PATH");
        let err = executor.execute(ctx).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Contract(ref msg) if msg.contains("ARTIFACTS_PATH")));

        let err = executor.execute(context("qa", vec![])).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Contract);
    }
}

//! Source action
//!
//! Captures the triggering change as an immutable source artifact and exports
//! its branch and commit.

use async_trait::async_trait;
use chrono::Utc;
use relay_core::domain::pipeline::ActionKind;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::artifact::{ArtifactStore, NewArtifact};
use crate::executor::{ActionContext, ActionExecutor, ActionOutput, ExecutorError};

pub struct SourceExecutor {
    store: Arc<dyn ArtifactStore>,
}

impl SourceExecutor {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionExecutor for SourceExecutor {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutput, ExecutorError> {
        let ActionKind::Source { branch } = &ctx.action.kind else {
            return Err(ExecutorError::Contract(format!(
                "action '{}' is not a source action",
                ctx.action.name
            )));
        };

        if &ctx.source_ref.branch != branch {
            return Err(ExecutorError::Source(format!(
                "branch '{}' does not trigger this pipeline (expected '{}')",
                ctx.source_ref.branch, branch
            )));
        }

        let commit = ctx.source_ref.commit.clone().unwrap_or_default();
        let descriptor = json!({
            "branch": ctx.source_ref.branch,
            "commit": commit,
            "run_id": ctx.run_id,
            "captured_at": Utc::now(),
        });
        let content = serde_json::to_vec_pretty(&descriptor)
            .map_err(|e| ExecutorError::Source(e.to_string()))?;

        let mut artifacts = Vec::new();
        for name in &ctx.action.outputs {
            let artifact = self
                .store
                .put(
                    NewArtifact {
                        run_id: ctx.run_id,
                        name: name.clone(),
                        stage: ctx.stage.clone(),
                        produced_by: ctx.action.name.clone(),
                    },
                    content.clone(),
                )
                .await?;
            artifacts.push(artifact);
        }

        tracing::info!(
            "Captured {}@{} for run {}",
            ctx.source_ref.branch,
            if commit.is_empty() { "HEAD" } else { commit.as_str() },
            ctx.run_id
        );

        Ok(ActionOutput {
            artifacts,
            variables: BTreeMap::from([
                ("BranchName".to_string(), ctx.source_ref.branch.clone()),
                ("CommitId".to_string(), commit),
            ]),
            ..Default::default()
        })
    }
}

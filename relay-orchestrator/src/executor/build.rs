//! Build action
//!
//! Runs the external build procedure in a fresh working directory. Input
//! artifacts are materialized under `inputs/`; the procedure writes each
//! declared output to `$RELAY_ARTIFACT_DIR/<name>` (the first one is also
//! available as `$RELAY_ARTIFACT`). Outputs are published only after the
//! procedure succeeds and every declared output exists.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifact::{ArtifactStore, NewArtifact};
use crate::executor::{ActionContext, ActionExecutor, ActionOutput, ExecutorError};
use crate::process::{self, ProcessError};

pub struct BuildExecutor {
    store: Arc<dyn ArtifactStore>,
    command: String,
    workspace_root: PathBuf,
}

impl BuildExecutor {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        command: impl Into<String>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            command: command.into(),
            workspace_root: workspace_root.into(),
        }
    }

    fn workdir(&self, ctx: &ActionContext) -> PathBuf {
        self.workspace_root
            .join(ctx.run_id.to_string())
            .join(format!("{}-{}", ctx.stage, ctx.action.name))
    }
}

async fn reset_dir(dir: &Path) -> Result<(), ProcessError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ProcessError::Workspace(e)),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(ProcessError::Workspace)
}

#[async_trait]
impl ActionExecutor for BuildExecutor {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutput, ExecutorError> {
        // Every attempt starts from an empty directory
        let workdir = self.workdir(&ctx);
        reset_dir(&workdir).await?;

        let input_dir = workdir.join("inputs");
        let artifact_dir = workdir.join("outputs");
        reset_dir(&input_dir).await?;
        reset_dir(&artifact_dir).await?;

        for input in &ctx.inputs {
            let content = self.store.get(input).await?;
            tokio::fs::write(input_dir.join(&input.name), content)
                .await
                .map_err(ProcessError::Workspace)?;
        }

        let mut env = ctx.env.clone();
        env.insert("RELAY_RUN_ID".to_string(), ctx.run_id.to_string());
        env.insert(
            "RELAY_INPUT_DIR".to_string(),
            input_dir.to_string_lossy().to_string(),
        );
        env.insert(
            "RELAY_ARTIFACT_DIR".to_string(),
            artifact_dir.to_string_lossy().to_string(),
        );
        if let Some(first) = ctx.action.outputs.first() {
            env.insert(
                "RELAY_ARTIFACT".to_string(),
                artifact_dir.join(first).to_string_lossy().to_string(),
            );
        }

        info!(
            "Building {}.{} for run {}",
            ctx.stage, ctx.action.name, ctx.run_id
        );
        let outcome = process::run_shell(&self.command, &env, &workdir).await?;

        if !outcome.success() {
            let reason = match outcome.exit_code {
                Some(code) => format!("build exited with status {}", code),
                None => "build was terminated by a signal".to_string(),
            };
            let tail = outcome.stderr_tail();
            return Err(ExecutorError::Build(if tail.is_empty() {
                reason
            } else {
                format!("{}: {}", reason, tail)
            }));
        }

        // Read every output before publishing any of them
        let mut contents = Vec::new();
        for name in &ctx.action.outputs {
            match tokio::fs::read(artifact_dir.join(name)).await {
                Ok(content) => contents.push((name.clone(), content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(ExecutorError::Build(format!(
                        "build did not produce artifact '{}'",
                        name
                    )));
                }
                Err(e) => return Err(ProcessError::Workspace(e).into()),
            }
        }

        let mut artifacts = Vec::new();
        for (name, content) in contents {
            let artifact = self
                .store
                .put(
                    NewArtifact {
                        run_id: ctx.run_id,
                        name,
                        stage: ctx.stage.clone(),
                        produced_by: ctx.action.name.clone(),
                    },
                    content,
                )
                .await?;
            artifacts.push(artifact);
        }

        let mut variables = outcome.exports;
        if !variables.contains_key("ARTIFACTS_PATH") {
            match artifacts.first() {
                Some(artifact) => {
                    variables.insert("ARTIFACTS_PATH".to_string(), artifact.location.clone());
                }
                None => warn!(
                    "Build {}.{} exported no ARTIFACTS_PATH and produced no artifact",
                    ctx.stage, ctx.action.name
                ),
            }
        }
        if !variables.contains_key("GIT_BRANCH") {
            let branch = ctx
                .env
                .get("GIT_BRANCH")
                .cloned()
                .unwrap_or_else(|| ctx.source_ref.branch.clone());
            variables.insert("GIT_BRANCH".to_string(), branch);
        }

        Ok(ActionOutput {
            artifacts,
            variables,
            ..Default::default()
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::artifact::InMemoryArtifactStore;
    use relay_core::domain::pipeline::{ActionDefinition, ActionKind};
    use relay_core::domain::run::SourceRef;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn context(run_id: Uuid) -> ActionContext {
        ActionContext {
            run_id,
            stage: "Build".to_string(),
            action: ActionDefinition {
                name: "Build".to_string(),
                kind: ActionKind::Build,
                run_order: 1,
                inputs: vec![],
                outputs: vec!["BuildArtifact".to_string()],
                env: BTreeMap::new(),
                variables_namespace: Some("BuildVariables".to_string()),
            },
            source_ref: SourceRef {
                branch: "main".to_string(),
                commit: None,
            },
            env: BTreeMap::from([
                ("S3_BUCKET".to_string(), "bkt".to_string()),
                ("GIT_BRANCH".to_string(), "main".to_string()),
            ]),
            inputs: vec![],
            approvals: vec![],
        }
    }

    fn workspace() -> PathBuf {
        std::env::temp_dir().join(format!("relay-build-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_build_publishes_artifact_and_exports() {
        let root = workspace();
        let store = Arc::new(InMemoryArtifactStore::new());
        let executor = BuildExecutor::new(
            store.clone(),
            "printf A1 > \"$RELAY_ARTIFACT\" && echo \"ARTIFACTS_PATH=s3://$S3_BUCKET/A1\" >> \"$RELAY_OUTPUT\"",
            &root,
        );

        let output = executor.execute(context(Uuid::new_v4())).await.unwrap();

        assert_eq!(output.artifacts.len(), 1);
        assert_eq!(store.get(&output.artifacts[0]).await.unwrap(), b"A1");
        assert_eq!(output.variables.get("ARTIFACTS_PATH").unwrap(), "s3://bkt/A1");
        assert_eq!(output.variables.get("GIT_BRANCH").unwrap(), "main");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_artifacts_path_defaults_to_store_location() {
        let root = workspace();
        let executor = BuildExecutor::new(
            Arc::new(InMemoryArtifactStore::new()),
            "printf A1 > \"$RELAY_ARTIFACT\"",
            &root,
        );

        let output = executor.execute(context(Uuid::new_v4())).await.unwrap();
        assert_eq!(
            output.variables.get("ARTIFACTS_PATH"),
            Some(&output.artifacts[0].location)
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_failed_build_publishes_nothing() {
        let root = workspace();
        let store = Arc::new(InMemoryArtifactStore::new());
        let executor = BuildExecutor::new(
            store.clone(),
            "printf partial > \"$RELAY_ARTIFACT\"; echo 'compile error' >&2; exit 2",
            &root,
        );
        let run_id = Uuid::new_v4();

        let err = executor.execute(context(run_id)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Build(ref msg) if msg.contains("compile error")));

        // A later successful attempt still publishes version 1
        let retry = BuildExecutor::new(store.clone(), "printf A1 > \"$RELAY_ARTIFACT\"", &root);
        let output = retry.execute(context(run_id)).await.unwrap();
        assert_eq!(output.artifacts[0].version, 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_missing_output_fails_build() {
        let root = workspace();
        let executor = BuildExecutor::new(Arc::new(InMemoryArtifactStore::new()), "true", &root);

        let err = executor.execute(context(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Build(ref msg) if msg.contains("BuildArtifact")));
        let _ = std::fs::remove_dir_all(&root);
    }
}

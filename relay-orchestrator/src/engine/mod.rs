//! Pipeline Orchestrator
//!
//! Each run is a sequential state machine driven by its own task. Stages run
//! in declaration order; inside a stage, actions sharing a run order are
//! dispatched together and joined before the next run order starts. The first
//! failing action cancels its siblings, fails the stage and ends the run.
//!
//! Every transition is persisted. A state that cannot be saved after
//! [`PERSIST_ATTEMPTS`] tries fails the run rather than letting it advance
//! unrecorded.

pub mod approval;
pub mod variables;

pub use approval::{ApprovalGate, GateError};

use chrono::Utc;
use relay_core::domain::approval::ApprovalRecord;
use relay_core::domain::pipeline::{
    ActionDefinition, ActionKind, PipelineDefinition, StageDefinition,
};
use relay_core::domain::run::{
    ActionStatus, FailureKind, Run, RunFailure, RunStatus, SourceRef, StageStatus,
};
use relay_core::domain::variables::VariableNamespace;
use relay_core::dto::approval::SubmitApproval;
use relay_core::dto::trigger::{PushEvent, TriggerResponse};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::executor::{ActionContext, ActionExecutor, ActionOutput, ExecutorError};
use crate::repository::{RepositoryError, RunRepository};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<GateError> for OrchestratorError {
    fn from(err: GateError) -> Self {
        OrchestratorError::Conflict(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Saves attempted for one run state before the run is failed
pub const PERSIST_ATTEMPTS: u32 = 3;

const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// Executors for the non-approval action kinds
#[derive(Clone)]
pub struct Executors {
    pub source: Arc<dyn ActionExecutor>,
    pub build: Arc<dyn ActionExecutor>,
    pub deploy: Arc<dyn ActionExecutor>,
}

pub struct Orchestrator {
    definition: Arc<PipelineDefinition>,
    trigger_branch: String,
    repository: Arc<dyn RunRepository>,
    executors: Executors,
    gate: Arc<ApprovalGate>,
    tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        definition: PipelineDefinition,
        trigger_branch: impl Into<String>,
        repository: Arc<dyn RunRepository>,
        executors: Executors,
    ) -> Self {
        Self {
            definition: Arc::new(definition),
            trigger_branch: trigger_branch.into(),
            repository,
            executors,
            gate: Arc::new(ApprovalGate::new()),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Whether the run is paused at the approval gate of `stage`
    pub fn is_awaiting_approval(&self, run_id: Uuid, stage: &str) -> bool {
        self.gate.is_awaiting(run_id, stage)
    }

    /// Creates a run for `source_ref` and starts driving it
    pub async fn start_run(self: &Arc<Self>, source_ref: SourceRef) -> Result<Run> {
        if source_ref.branch != self.trigger_branch {
            return Err(OrchestratorError::InvalidRequest(format!(
                "branch '{}' does not trigger pipeline {} (expected '{}')",
                source_ref.branch, self.definition.name, self.trigger_branch
            )));
        }

        let run = Run::new(&self.definition, source_ref);
        self.repository.save(&run).await?;

        info!(
            "Run {} started for {} on branch {}",
            run.id, run.pipeline, run.source_ref.branch
        );

        self.spawn(run.clone(), 0);
        Ok(run)
    }

    /// Handles a change notification; only the trigger branch starts a run
    pub async fn push(self: &Arc<Self>, event: PushEvent) -> Result<TriggerResponse> {
        match event.branch() {
            Some(branch) if branch == self.trigger_branch => {
                let run = self
                    .start_run(SourceRef {
                        branch: branch.to_string(),
                        commit: event.after.clone(),
                    })
                    .await?;
                Ok(TriggerResponse {
                    triggered: true,
                    run_id: Some(run.id),
                })
            }
            _ => {
                debug!("Ignoring push to {}", event.git_ref);
                Ok(TriggerResponse {
                    triggered: false,
                    run_id: None,
                })
            }
        }
    }

    pub async fn get_run(&self, id: Uuid) -> Result<Run> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(OrchestratorError::RunNotFound(id))
    }

    pub async fn list_runs(&self) -> Result<Vec<Run>> {
        Ok(self.repository.list_all().await?)
    }

    /// Records the operator decision for a stage paused at an approval gate
    pub async fn submit_approval(
        &self,
        run_id: Uuid,
        req: SubmitApproval,
    ) -> Result<ApprovalRecord> {
        let run = self.get_run(run_id).await?;
        if run.is_terminal() {
            return Err(OrchestratorError::Conflict(format!(
                "run {} is already {}",
                run_id, run.status
            )));
        }

        Ok(self.gate.submit(run_id, &req.stage, req.decision, req.comment)?)
    }

    /// Stops a run at whatever point it is suspended
    ///
    /// Deployments already handed to the traffic-shift controller finish on
    /// their own.
    pub async fn cancel_run(&self, id: Uuid) -> Result<Run> {
        let handle = self.tasks.lock().unwrap().remove(&id);
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.gate.release_run(id);

        let mut run = self.get_run(id).await?;
        if run.is_terminal() {
            return Err(OrchestratorError::Conflict(format!(
                "run {} is already {}",
                id, run.status
            )));
        }

        let now = Utc::now();
        for stage in &mut run.stages {
            if stage.status == StageStatus::InProgress {
                stage.status = StageStatus::Cancelled;
                stage.completed_at = Some(now);
            }
            for action in &mut stage.actions {
                if action.status == ActionStatus::InProgress {
                    action.status = ActionStatus::Cancelled;
                    action.completed_at = Some(now);
                }
            }
        }
        run.status = RunStatus::Cancelled;
        run.completed_at = Some(now);
        run.touch();
        self.repository.save(&run).await?;

        info!("Run {} cancelled", id);
        Ok(run)
    }

    /// Re-runs the failed stage of a run from its start
    pub async fn retry_run(self: &Arc<Self>, id: Uuid) -> Result<Run> {
        let mut run = self.get_run(id).await?;
        if run.status != RunStatus::Failed {
            return Err(OrchestratorError::Conflict(format!(
                "run {} is {}, only failed runs can be retried",
                id, run.status
            )));
        }

        let index = run.failed_stage_index().ok_or_else(|| {
            OrchestratorError::Conflict(format!("run {} has no failed stage", id))
        })?;
        let stage_definition = &self.definition.stages[index];

        // An approval decision is terminal: a run never passes the same gate twice
        if !run.approvals_for(&stage_definition.name).is_empty() {
            return Err(OrchestratorError::Conflict(format!(
                "stage '{}' of run {} already holds an approval decision",
                stage_definition.name, id
            )));
        }

        for action in &stage_definition.actions {
            for output in &action.outputs {
                run.artifacts.remove(output);
            }
            if let Some(namespace) = &action.variables_namespace {
                run.variables.remove(namespace);
            }
        }
        if let Some(stage) = run.stage_mut(&stage_definition.name) {
            stage.status = StageStatus::Pending;
            stage.started_at = None;
            stage.completed_at = None;
            for action in &mut stage.actions {
                action.reset();
            }
        }
        run.status = RunStatus::Running;
        run.failure = None;
        run.completed_at = None;
        run.touch();
        self.repository.save(&run).await?;

        info!("Retrying stage '{}' of run {}", stage_definition.name, id);
        self.spawn(run.clone(), index);
        Ok(run)
    }

    fn spawn(self: &Arc<Self>, run: Run, from_stage: usize) {
        let id = run.id;
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move { orchestrator.drive(run, from_stage).await });

        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(id, handle);
    }

    /// Persists the run, retrying with a linear backoff
    async fn save(&self, run: &mut Run) -> std::result::Result<(), RepositoryError> {
        run.touch();
        let mut attempt = 1;
        loop {
            match self.repository.save(run).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < PERSIST_ATTEMPTS => {
                    warn!(
                        "Failed to persist run {} (attempt {}/{}): {}",
                        run.id, attempt, PERSIST_ATTEMPTS, e
                    );
                    tokio::time::sleep(PERSIST_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "Failed to persist run {} after {} attempts: {}",
                        run.id, PERSIST_ATTEMPTS, e
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn drive(self: Arc<Self>, mut run: Run, from_stage: usize) {
        let definition = Arc::clone(&self.definition);

        for stage in definition.stages.iter().skip(from_stage) {
            run.current_stage = Some(stage.name.clone());
            if let Some(execution) = run.stage_mut(&stage.name) {
                execution.status = StageStatus::InProgress;
                execution.started_at = Some(Utc::now());
            }

            let mut result = match self.save(&mut run).await {
                Ok(()) => {
                    info!("Run {} entered stage '{}'", run.id, stage.name);
                    self.run_stage(&mut run, stage).await
                }
                Err(e) => Err(persistence_failure(&stage.name, "", &e)),
            };

            let now = Utc::now();
            if result.is_ok() {
                if let Some(execution) = run.stage_mut(&stage.name) {
                    execution.status = StageStatus::Succeeded;
                    execution.completed_at = Some(now);
                }
                if let Err(e) = self.save(&mut run).await {
                    result = Err(persistence_failure(&stage.name, "", &e));
                }
            }

            if let Err(failure) = result {
                warn!(
                    "Run {} failed in {}.{}: {}",
                    run.id, failure.stage, failure.action, failure.message
                );
                if let Some(execution) = run.stage_mut(&stage.name) {
                    execution.status = StageStatus::Failed;
                    execution.completed_at = Some(now);
                }
                run.status = RunStatus::Failed;
                run.failure = Some(failure);
                run.completed_at = Some(now);
                self.gate.release_run(run.id);
                let _ = self.save(&mut run).await;
                return;
            }
        }

        run.status = RunStatus::Succeeded;
        run.completed_at = Some(Utc::now());
        self.gate.release_run(run.id);
        match self.save(&mut run).await {
            Ok(()) => info!("Run {} succeeded", run.id),
            Err(_) => error!("Run {} succeeded but its final state was not recorded", run.id),
        }
    }

    fn executor_for(&self, kind: &ActionKind) -> Arc<dyn ActionExecutor> {
        match kind {
            ActionKind::Source { .. } => Arc::clone(&self.executors.source),
            ActionKind::Build => Arc::clone(&self.executors.build),
            ActionKind::Deploy => Arc::clone(&self.executors.deploy),
            ActionKind::Approval { .. } => Arc::clone(&self.gate) as Arc<dyn ActionExecutor>,
        }
    }

    /// Builds the context of an action from the run's accumulated state
    fn context(
        &self,
        run: &Run,
        stage: &str,
        action: &ActionDefinition,
    ) -> std::result::Result<ActionContext, String> {
        let inputs = action
            .inputs
            .iter()
            .map(|name| {
                run.artifacts
                    .get(name)
                    .cloned()
                    .ok_or_else(|| format!("input artifact '{}' has not been produced", name))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(ActionContext {
            run_id: run.id,
            stage: stage.to_string(),
            action: action.clone(),
            source_ref: run.source_ref.clone(),
            env: variables::resolve_env(action, &run.variables)?,
            inputs,
            approvals: run.approvals_for(stage),
        })
    }

    async fn run_stage(
        &self,
        run: &mut Run,
        stage: &StageDefinition,
    ) -> std::result::Result<(), RunFailure> {
        for (run_order, group) in stage.run_order_groups() {
            // Contexts are built before dispatch: actions of one run order
            // never see each other's outputs
            let mut contexts = Vec::with_capacity(group.len());
            for action in &group {
                match self.context(run, &stage.name, action) {
                    Ok(ctx) => contexts.push(ctx),
                    Err(message) => {
                        let err = ExecutorError::Contract(message);
                        self.fail_action(run, &stage.name, &action.name, &err);
                        return Err(failure(&stage.name, &action.name, &err));
                    }
                }
            }

            let mut set = JoinSet::new();
            let mut names = HashMap::new();
            let now = Utc::now();
            for ctx in contexts {
                if let Some(execution) = run
                    .stage_mut(&stage.name)
                    .and_then(|s| s.action_mut(&ctx.action.name))
                {
                    execution.status = ActionStatus::InProgress;
                    execution.attempt += 1;
                    execution.started_at = Some(now);
                }

                let action = ctx.action.clone();
                let executor = self.executor_for(&action.kind);
                let handle = set.spawn(async move { executor.execute(ctx).await });
                names.insert(handle.id(), action);
            }
            if let Err(e) = self.save(run).await {
                // Dropping the set aborts everything just dispatched
                self.cancel_in_progress(run, &stage.name);
                return Err(persistence_failure(&stage.name, "", &e));
            }

            debug!(
                "Run {} dispatched {} action(s) of stage '{}' at run order {}",
                run.id,
                names.len(),
                stage.name,
                run_order
            );

            while let Some(joined) = set.join_next_with_id().await {
                let (action, result) = match joined {
                    Ok((id, result)) => (names.get(&id).cloned(), result),
                    Err(e) => (
                        names.get(&e.id()).cloned(),
                        Err(ExecutorError::Contract(format!("action task failed: {}", e))),
                    ),
                };
                let Some(action) = action else { continue };

                match result {
                    Ok(output) => {
                        self.record_output(run, &stage.name, &action, output);
                        if let Err(e) = self.save(run).await {
                            set.abort_all();
                            self.cancel_in_progress(run, &stage.name);
                            return Err(persistence_failure(&stage.name, &action.name, &e));
                        }
                    }
                    Err(err) => {
                        set.abort_all();
                        self.fail_action(run, &stage.name, &action.name, &err);
                        self.cancel_in_progress(run, &stage.name);
                        return Err(failure(&stage.name, &action.name, &err));
                    }
                }
            }
        }

        Ok(())
    }

    fn record_output(
        &self,
        run: &mut Run,
        stage: &str,
        action: &ActionDefinition,
        output: ActionOutput,
    ) {
        let names: Vec<String> = output.artifacts.iter().map(|a| a.name.clone()).collect();
        for artifact in output.artifacts {
            run.artifacts.insert(artifact.name.clone(), artifact);
        }

        if let Some(namespace) = &action.variables_namespace {
            run.variables.insert(
                namespace.clone(),
                VariableNamespace {
                    name: namespace.clone(),
                    stage: stage.to_string(),
                    produced_by: action.name.clone(),
                    run_order: action.run_order,
                    values: output.variables,
                },
            );
        }

        if let Some(record) = output.approval {
            run.approvals.push(record);
        }

        if let Some(execution) = run.stage_mut(stage).and_then(|s| s.action_mut(&action.name)) {
            execution.status = ActionStatus::Succeeded;
            execution.outputs = names;
            execution.deployment_id = output.deployment_id;
            execution.completed_at = Some(Utc::now());
        }

        info!("Run {}: {}.{} succeeded", run.id, stage, action.name);
    }

    fn fail_action(&self, run: &mut Run, stage: &str, action: &str, err: &ExecutorError) {
        if let ExecutorError::ApprovalRejected(record) = err {
            run.approvals.push(record.clone());
        }

        if let Some(execution) = run.stage_mut(stage).and_then(|s| s.action_mut(action)) {
            execution.status = ActionStatus::Failed;
            execution.error = Some(err.to_string());
            execution.deployment_id = err.deployment_id();
            execution.completed_at = Some(Utc::now());
        }
    }

    fn cancel_in_progress(&self, run: &mut Run, stage: &str) {
        if let Some(execution) = run.stage_mut(stage) {
            for action in &mut execution.actions {
                if action.status == ActionStatus::InProgress {
                    action.status = ActionStatus::Cancelled;
                    action.completed_at = Some(Utc::now());
                }
            }
        }
        self.gate.release_run(run.id);
    }
}

fn failure(stage: &str, action: &str, err: &ExecutorError) -> RunFailure {
    RunFailure {
        stage: stage.to_string(),
        action: action.to_string(),
        kind: err.kind(),
        message: err.to_string(),
    }
}

fn persistence_failure(stage: &str, action: &str, err: &RepositoryError) -> RunFailure {
    RunFailure {
        stage: stage.to_string(),
        action: action.to_string(),
        kind: FailureKind::Internal,
        message: format!("run state could not be persisted: {}", err),
    }
}

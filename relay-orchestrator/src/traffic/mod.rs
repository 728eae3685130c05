//! Traffic-Shift Controller
//!
//! Owns the environment aliases and moves traffic to a new revision only after
//! its pre-traffic hook reports success. Each deployment runs on its own task
//! and publishes its state on a `watch` channel; callers that stop watching
//! never interrupt a shift halfway. Finished deployments stay queryable for a
//! retention period and are then evicted.

pub mod hook_invoker;
pub mod provisioner;
pub mod shift;

pub use hook_invoker::{CommandHookInvoker, HookExit, HookInvoker};
pub use provisioner::{CommandProvisioner, ProvisionRequest, Provisioner};
pub use shift::ShiftPolicy;

use chrono::Utc;
use relay_core::domain::deployment::{
    Deployment, DeploymentState, Environment, EnvironmentAlias, Revision,
};
use relay_core::domain::hook::{HookExecutionStatus, HookStatus, LifecycleHookExecution};
use relay_core::dto::hook::HookEvent;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrafficError {
    #[error("deployment {0} not found")]
    NotFound(Uuid),

    #[error("hook execution {hook_execution_id} does not belong to deployment {deployment_id}")]
    HookNotFound {
        deployment_id: Uuid,
        hook_execution_id: Uuid,
    },

    #[error("hook execution {0} has already reported")]
    AlreadyReported(Uuid),
}

/// A request to deploy an artifact to an environment
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub run_id: Uuid,
    pub environment: Environment,
    pub stack_name: String,
    pub artifacts_path: String,
    pub env: BTreeMap<String, String>,
}

struct DeploymentEntry {
    state: watch::Sender<Deployment>,
    report: Option<oneshot::Sender<HookStatus>>,
}

/// How long a finished deployment stays queryable by default
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

pub struct TrafficController {
    provisioner: Arc<dyn Provisioner>,
    hook_invoker: Arc<dyn HookInvoker>,
    policy: ShiftPolicy,
    hook_timeout: Duration,
    retention: Duration,
    deployments: Mutex<HashMap<Uuid, DeploymentEntry>>,
    aliases: Mutex<HashMap<Environment, EnvironmentAlias>>,
    environment_locks: Mutex<HashMap<Environment, Arc<tokio::sync::Mutex<()>>>>,
}

impl TrafficController {
    pub fn new(
        provisioner: Arc<dyn Provisioner>,
        hook_invoker: Arc<dyn HookInvoker>,
        policy: ShiftPolicy,
        hook_timeout: Duration,
    ) -> Self {
        Self {
            provisioner,
            hook_invoker,
            policy,
            hook_timeout,
            retention: DEFAULT_RETENTION,
            deployments: Mutex::new(HashMap::new()),
            aliases: Mutex::new(HashMap::new()),
            environment_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Sets how long a finished deployment stays queryable
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Starts a deployment and returns a receiver tracking its state
    ///
    /// Deployments to the same environment are applied one at a time.
    pub fn deploy(self: &Arc<Self>, request: DeployRequest) -> (Uuid, watch::Receiver<Deployment>) {
        let now = Utc::now();
        let deployment = Deployment {
            id: Uuid::new_v4(),
            run_id: request.run_id,
            environment: request.environment,
            stack_name: request.stack_name.clone(),
            artifacts_path: request.artifacts_path.clone(),
            state: DeploymentState::Provisioning,
            revision: None,
            previous_revision: None,
            hook_execution: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let id = deployment.id;

        let (tx, rx) = watch::channel(deployment);
        self.deployments.lock().unwrap().insert(
            id,
            DeploymentEntry {
                state: tx,
                report: None,
            },
        );

        info!(
            "Deployment {} created for run {} to {} ({})",
            id, request.run_id, request.environment, request.stack_name
        );

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.run_deployment(id, request).await;
            tokio::time::sleep(controller.retention).await;
            controller.evict(id);
        });

        (id, rx)
    }

    /// Records the single status report of a hook execution
    pub fn report_hook_status(
        &self,
        deployment_id: Uuid,
        hook_execution_id: Uuid,
        status: HookStatus,
    ) -> Result<(), TrafficError> {
        let mut deployments = self.deployments.lock().unwrap();
        let entry = deployments
            .get_mut(&deployment_id)
            .ok_or(TrafficError::NotFound(deployment_id))?;

        let current = entry.state.borrow().hook_execution.clone();
        let execution = current
            .filter(|e| e.id == hook_execution_id)
            .ok_or(TrafficError::HookNotFound {
                deployment_id,
                hook_execution_id,
            })?;

        if execution.status != HookExecutionStatus::Pending {
            return Err(TrafficError::AlreadyReported(hook_execution_id));
        }
        let sender = entry
            .report
            .take()
            .ok_or(TrafficError::AlreadyReported(hook_execution_id))?;

        entry.state.send_modify(|d| {
            if let Some(execution) = d.hook_execution.as_mut() {
                execution.status = status.into();
                execution.reported_at = Some(Utc::now());
            }
            d.updated_at = Utc::now();
        });
        let _ = sender.send(status);

        info!(
            "Hook {} reported {} for deployment {}",
            hook_execution_id, status, deployment_id
        );
        Ok(())
    }

    pub fn get_deployment(&self, id: Uuid) -> Option<Deployment> {
        self.deployments
            .lock()
            .unwrap()
            .get(&id)
            .map(|entry| entry.state.borrow().clone())
    }

    /// Current routing of an environment
    pub fn get_environment(&self, environment: Environment) -> EnvironmentAlias {
        self.aliases
            .lock()
            .unwrap()
            .get(&environment)
            .cloned()
            .unwrap_or_else(|| EnvironmentAlias::new(environment))
    }

    /// Drops a finished deployment; reports against it are then `NotFound`
    fn evict(&self, id: Uuid) {
        let mut deployments = self.deployments.lock().unwrap();
        let terminal = deployments
            .get(&id)
            .is_some_and(|entry| entry.state.borrow().state.is_terminal());
        if terminal {
            deployments.remove(&id);
            debug!("Deployment {} evicted after {:?}", id, self.retention);
        }
    }

    fn environment_lock(&self, environment: Environment) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.environment_locks
                .lock()
                .unwrap()
                .entry(environment)
                .or_default(),
        )
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut Deployment)) {
        if let Some(entry) = self.deployments.lock().unwrap().get(&id) {
            entry.state.send_modify(|d| {
                f(d);
                d.updated_at = Utc::now();
            });
        }
    }

    fn update_alias(&self, environment: Environment, f: impl FnOnce(&mut EnvironmentAlias)) {
        let mut aliases = self.aliases.lock().unwrap();
        let alias = aliases
            .entry(environment)
            .or_insert_with(|| EnvironmentAlias::new(environment));
        f(alias);
        alias.updated_at = Utc::now();
    }

    async fn run_deployment(&self, id: Uuid, request: DeployRequest) {
        let lock = self.environment_lock(request.environment);
        let _guard = lock.lock().await;

        let previous = self.get_environment(request.environment).live;
        self.update(id, |d| d.previous_revision = previous.as_ref().map(|r| r.id));

        let provision = ProvisionRequest {
            deployment_id: id,
            revision_id: Uuid::new_v4(),
            environment: request.environment,
            stack_name: request.stack_name.clone(),
            artifacts_path: request.artifacts_path.clone(),
            env: request.env.clone(),
        };

        let provisioned = match self.provisioner.provision(&provision).await {
            Ok(provisioned) => provisioned,
            Err(e) => {
                error!("Provisioning failed for deployment {}: {}", id, e);
                self.update(id, |d| {
                    d.state = DeploymentState::Failed;
                    d.error = Some(e.to_string());
                });
                return;
            }
        };

        let revision = Revision {
            id: provision.revision_id,
            environment: request.environment,
            stack_name: request.stack_name.clone(),
            artifacts_path: request.artifacts_path.clone(),
            url: provisioned.url,
            created_at: Utc::now(),
        };

        let execution = LifecycleHookExecution::new(id);
        let event = HookEvent {
            deployment_id: id,
            hook_execution_id: execution.id,
            revision_url: revision.url.clone(),
        };

        let (report_tx, report_rx) = oneshot::channel();
        if let Some(entry) = self.deployments.lock().unwrap().get_mut(&id) {
            entry.report = Some(report_tx);
            entry.state.send_modify(|d| {
                d.state = DeploymentState::ValidationPending;
                d.revision = Some(revision.clone());
                d.hook_execution = Some(execution);
                d.updated_at = Utc::now();
            });
        }
        self.update_alias(request.environment, |alias| {
            alias.candidate = Some(revision.clone());
            alias.candidate_weight = 0;
        });

        info!(
            "Revision {} provisioned for deployment {}, awaiting pre-traffic validation",
            revision.id, id
        );

        let status = match self.hook_invoker.invoke(&event).await {
            Ok(exit) => self.await_report(id, report_rx, exit).await,
            Err(e) => {
                error!("Failed to launch pre-traffic hook for deployment {}: {}", id, e);
                self.close_hook(id, false);
                self.update(id, |d| {
                    d.error = Some(format!("failed to launch pre-traffic hook: {}", e));
                });
                HookStatus::Failed
            }
        };

        match status {
            HookStatus::Succeeded => self.shift(id, request.environment, revision).await,
            HookStatus::Failed => self.roll_back(id, request.environment),
        }
    }

    /// Waits for the hook report, bounded by the hook timeout and by the hook's exit
    async fn await_report(
        &self,
        id: Uuid,
        report: oneshot::Receiver<HookStatus>,
        exit: HookExit,
    ) -> HookStatus {
        tokio::select! {
            // A report delivered just before the process exited still counts
            biased;
            reported = report => reported.unwrap_or(HookStatus::Failed),
            description = exit.wait() => {
                warn!(
                    "Pre-traffic hook for deployment {} exited ({}) before reporting",
                    id, description
                );
                self.close_unreported(
                    id,
                    false,
                    format!("pre-traffic hook exited without reporting: {}", description),
                )
            }
            _ = tokio::time::sleep(self.hook_timeout) => {
                warn!(
                    "Pre-traffic hook for deployment {} did not report within {:?}",
                    id, self.hook_timeout
                );
                self.close_unreported(id, true, "pre-traffic hook timed out".to_string())
            }
        }
    }

    /// Closes a hook that stopped waiting for its report
    ///
    /// A report may have landed between the wait ending and now; it wins.
    fn close_unreported(&self, id: Uuid, timed_out: bool, reason: String) -> HookStatus {
        match self.close_hook(id, timed_out) {
            Some(HookExecutionStatus::Succeeded) => HookStatus::Succeeded,
            Some(_) => HookStatus::Failed,
            None => {
                self.update(id, |d| d.error = Some(reason));
                HookStatus::Failed
            }
        }
    }

    /// Marks a pending hook execution Failed and refuses later reports
    ///
    /// Returns the status already reported, if a report won the race.
    fn close_hook(&self, id: Uuid, timed_out: bool) -> Option<HookExecutionStatus> {
        let mut deployments = self.deployments.lock().unwrap();
        let entry = deployments.get_mut(&id)?;
        entry.report = None;

        let status = entry.state.borrow().hook_execution.as_ref().map(|e| e.status);
        match status {
            Some(HookExecutionStatus::Pending) => {
                entry.state.send_modify(|d| {
                    if let Some(execution) = d.hook_execution.as_mut() {
                        execution.status = HookExecutionStatus::Failed;
                        execution.timed_out = timed_out;
                    }
                    d.updated_at = Utc::now();
                });
                None
            }
            other => other,
        }
    }

    async fn shift(&self, id: Uuid, environment: Environment, revision: Revision) {
        for step in self.policy.schedule() {
            if step.weight >= 100 {
                break;
            }
            self.update_alias(environment, |alias| alias.candidate_weight = step.weight);
            info!(
                "Routing {}% of {} traffic to revision {}",
                step.weight, environment, revision.id
            );
            tokio::time::sleep(step.hold).await;
        }

        self.update_alias(environment, |alias| {
            alias.previous = alias.live.take();
            alias.live = Some(revision.clone());
            alias.candidate = None;
            alias.candidate_weight = 0;
        });
        self.update(id, |d| d.state = DeploymentState::Live);

        info!("Revision {} is live in {}", revision.id, environment);
    }

    fn roll_back(&self, id: Uuid, environment: Environment) {
        self.update_alias(environment, |alias| {
            alias.candidate = None;
            alias.candidate_weight = 0;
        });
        self.update(id, |d| {
            d.state = DeploymentState::RolledBack;
            if d.error.is_none() {
                d.error = Some("pre-traffic validation failed".to_string());
            }
        });

        warn!("Deployment {} rolled back, {} routing unchanged", id, environment);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use provisioner::{ProvisionError, ProvisionedRevision};
    use tokio::sync::mpsc;

    /// Provisioner that succeeds with a fake URL unless told to fail
    pub struct FakeProvisioner {
        pub fail: bool,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn provision(
            &self,
            request: &ProvisionRequest,
        ) -> Result<ProvisionedRevision, ProvisionError> {
            if self.fail {
                return Err(ProvisionError::Failed {
                    exit_code: Some(1),
                    message: "stack update failed".to_string(),
                });
            }
            Ok(ProvisionedRevision {
                url: Some(format!("http://revision-{}", request.revision_id)),
            })
        }
    }

    /// Hook invoker that forwards every event to the test
    pub struct ChannelHookInvoker {
        pub events: mpsc::UnboundedSender<HookEvent>,
    }

    #[async_trait]
    impl HookInvoker for ChannelHookInvoker {
        async fn invoke(&self, event: &HookEvent) -> Result<HookExit, std::io::Error> {
            let _ = self.events.send(event.clone());
            Ok(HookExit::untracked())
        }
    }

    /// Hook invoker that reports a fixed status as soon as it is launched
    pub struct AutoReportHookInvoker {
        pub controller: std::sync::OnceLock<std::sync::Weak<TrafficController>>,
        pub status: HookStatus,
    }

    #[async_trait]
    impl HookInvoker for AutoReportHookInvoker {
        async fn invoke(&self, event: &HookEvent) -> Result<HookExit, std::io::Error> {
            let controller = self.controller.get().and_then(|c| c.upgrade());
            let event = event.clone();
            let status = self.status;
            tokio::spawn(async move {
                if let Some(controller) = controller {
                    let _ = controller.report_hook_status(
                        event.deployment_id,
                        event.hook_execution_id,
                        status,
                    );
                }
            });
            Ok(HookExit::untracked())
        }
    }

    /// Controller whose hook always reports `status`
    pub fn auto_reporting_controller(status: HookStatus) -> Arc<TrafficController> {
        let invoker = Arc::new(AutoReportHookInvoker {
            controller: std::sync::OnceLock::new(),
            status,
        });
        let controller = Arc::new(TrafficController::new(
            Arc::new(FakeProvisioner { fail: false }),
            invoker.clone(),
            ShiftPolicy::AllAtOnce,
            Duration::from_secs(5),
        ));
        let _ = invoker.controller.set(Arc::downgrade(&controller));
        controller
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tokio::sync::mpsc;

    fn controller(
        fail_provisioning: bool,
        hook_timeout: Duration,
    ) -> (Arc<TrafficController>, mpsc::UnboundedReceiver<HookEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let controller = Arc::new(TrafficController::new(
            Arc::new(FakeProvisioner {
                fail: fail_provisioning,
            }),
            Arc::new(ChannelHookInvoker { events }),
            ShiftPolicy::AllAtOnce,
            hook_timeout,
        ));
        (controller, rx)
    }

    fn request() -> DeployRequest {
        DeployRequest {
            run_id: Uuid::new_v4(),
            environment: Environment::Staging,
            stack_name: "CustomersApiStaging".to_string(),
            artifacts_path: "s3://bkt/A1".to_string(),
            env: BTreeMap::new(),
        }
    }

    async fn finish(mut rx: watch::Receiver<Deployment>) -> Deployment {
        rx.wait_for(|d| d.state.is_terminal()).await.unwrap().clone()
    }

    #[tokio::test]
    async fn test_hook_success_makes_revision_live() {
        let (controller, mut events) = controller(false, Duration::from_secs(5));

        let (id, rx) = controller.deploy(request());
        let event = events.recv().await.unwrap();
        assert_eq!(event.deployment_id, id);
        assert!(event.revision_url.is_some());
        assert_eq!(
            controller.get_deployment(id).unwrap().state,
            DeploymentState::ValidationPending
        );

        controller
            .report_hook_status(id, event.hook_execution_id, HookStatus::Succeeded)
            .unwrap();

        let deployment = finish(rx).await;
        assert_eq!(deployment.state, DeploymentState::Live);

        let alias = controller.get_environment(Environment::Staging);
        assert_eq!(alias.live, deployment.revision);
        assert!(alias.candidate.is_none());
    }

    #[tokio::test]
    async fn test_hook_failure_keeps_previous_revision_live() {
        let (controller, mut events) = controller(false, Duration::from_secs(5));

        let (first, rx) = controller.deploy(request());
        let event = events.recv().await.unwrap();
        controller
            .report_hook_status(first, event.hook_execution_id, HookStatus::Succeeded)
            .unwrap();
        let live = finish(rx).await.revision;

        let (second, rx) = controller.deploy(request());
        let event = events.recv().await.unwrap();
        controller
            .report_hook_status(second, event.hook_execution_id, HookStatus::Failed)
            .unwrap();

        let deployment = finish(rx).await;
        assert_eq!(deployment.state, DeploymentState::RolledBack);
        assert_eq!(deployment.previous_revision, live.as_ref().map(|r| r.id));

        let alias = controller.get_environment(Environment::Staging);
        assert_eq!(alias.live, live);
        assert!(alias.candidate.is_none());
        assert_eq!(alias.candidate_weight, 0);
    }

    #[tokio::test]
    async fn test_unreported_hook_times_out() {
        let (controller, mut events) = controller(false, Duration::from_millis(50));

        let (id, rx) = controller.deploy(request());
        let event = events.recv().await.unwrap();

        let deployment = finish(rx).await;
        assert_eq!(deployment.state, DeploymentState::RolledBack);
        let execution = deployment.hook_execution.unwrap();
        assert!(execution.timed_out);
        assert_eq!(execution.status, HookExecutionStatus::Failed);

        assert_eq!(
            controller.report_hook_status(id, event.hook_execution_id, HookStatus::Succeeded),
            Err(TrafficError::AlreadyReported(event.hook_execution_id))
        );
        assert!(controller.get_environment(Environment::Staging).live.is_none());
    }

    #[tokio::test]
    async fn test_exactly_one_report_is_accepted() {
        let (controller, mut events) = controller(false, Duration::from_secs(5));

        let (id, rx) = controller.deploy(request());
        let event = events.recv().await.unwrap();

        let unknown = Uuid::new_v4();
        assert_eq!(
            controller.report_hook_status(unknown, event.hook_execution_id, HookStatus::Succeeded),
            Err(TrafficError::NotFound(unknown))
        );
        let wrong = Uuid::new_v4();
        assert_eq!(
            controller.report_hook_status(id, wrong, HookStatus::Succeeded),
            Err(TrafficError::HookNotFound {
                deployment_id: id,
                hook_execution_id: wrong
            })
        );

        controller
            .report_hook_status(id, event.hook_execution_id, HookStatus::Failed)
            .unwrap();
        assert_eq!(
            controller.report_hook_status(id, event.hook_execution_id, HookStatus::Succeeded),
            Err(TrafficError::AlreadyReported(event.hook_execution_id))
        );

        assert_eq!(finish(rx).await.state, DeploymentState::RolledBack);
    }

    #[tokio::test]
    async fn test_provisioning_failure_leaves_alias_untouched() {
        let (controller, mut events) = controller(true, Duration::from_secs(5));

        let (_, rx) = controller.deploy(request());
        let deployment = finish(rx).await;

        assert_eq!(deployment.state, DeploymentState::Failed);
        assert!(deployment.revision.is_none());
        assert!(deployment.hook_execution.is_none());
        assert!(deployment.error.unwrap().contains("stack update failed"));
        assert!(events.try_recv().is_err());

        let alias = controller.get_environment(Environment::Staging);
        assert!(alias.live.is_none());
        assert!(alias.candidate.is_none());
    }

    #[tokio::test]
    async fn test_linear_shift_ends_live() {
        let (events, mut rx_events) = mpsc::unbounded_channel();
        let controller = Arc::new(TrafficController::new(
            Arc::new(FakeProvisioner { fail: false }),
            Arc::new(ChannelHookInvoker { events }),
            ShiftPolicy::Linear {
                step_percent: 50,
                interval: Duration::from_millis(10),
            },
            Duration::from_secs(5),
        ));

        let (id, rx) = controller.deploy(request());
        let event = rx_events.recv().await.unwrap();
        controller
            .report_hook_status(id, event.hook_execution_id, HookStatus::Succeeded)
            .unwrap();

        let deployment = finish(rx).await;
        assert_eq!(deployment.state, DeploymentState::Live);
        let alias = controller.get_environment(Environment::Staging);
        assert_eq!(alias.live, deployment.revision);
        assert_eq!(alias.candidate_weight, 0);
    }

    /// Hook that optionally reports, then exits straight away
    struct ExitingHookInvoker {
        controller: std::sync::OnceLock<std::sync::Weak<TrafficController>>,
        report: Option<HookStatus>,
    }

    #[async_trait::async_trait]
    impl HookInvoker for ExitingHookInvoker {
        async fn invoke(&self, event: &HookEvent) -> Result<HookExit, std::io::Error> {
            if let (Some(status), Some(controller)) =
                (self.report, self.controller.get().and_then(|c| c.upgrade()))
            {
                let _ = controller.report_hook_status(
                    event.deployment_id,
                    event.hook_execution_id,
                    status,
                );
            }
            let (exited, exit) = HookExit::channel();
            let _ = exited.send("exit status: 0".to_string());
            Ok(exit)
        }
    }

    fn exiting_controller(report: Option<HookStatus>) -> Arc<TrafficController> {
        let invoker = Arc::new(ExitingHookInvoker {
            controller: std::sync::OnceLock::new(),
            report,
        });
        let controller = Arc::new(TrafficController::new(
            Arc::new(FakeProvisioner { fail: false }),
            invoker.clone(),
            ShiftPolicy::AllAtOnce,
            Duration::from_secs(3600),
        ));
        let _ = invoker.controller.set(Arc::downgrade(&controller));
        controller
    }

    #[tokio::test]
    async fn test_hook_exit_without_report_rolls_back_before_timeout() {
        let controller = exiting_controller(None);

        let (_, rx) = controller.deploy(request());
        let deployment = tokio::time::timeout(Duration::from_secs(5), finish(rx))
            .await
            .expect("exit did not end the wait");

        assert_eq!(deployment.state, DeploymentState::RolledBack);
        let execution = deployment.hook_execution.unwrap();
        assert_eq!(execution.status, HookExecutionStatus::Failed);
        assert!(!execution.timed_out);
        assert!(deployment.error.unwrap().contains("exited without reporting"));

        let alias = controller.get_environment(Environment::Staging);
        assert!(alias.live.is_none());
        assert!(alias.candidate.is_none());
    }

    #[tokio::test]
    async fn test_report_before_exit_is_honored() {
        let controller = exiting_controller(Some(HookStatus::Succeeded));

        let (_, rx) = controller.deploy(request());
        let deployment = finish(rx).await;

        assert_eq!(deployment.state, DeploymentState::Live);
        assert_eq!(
            deployment.hook_execution.unwrap().status,
            HookExecutionStatus::Succeeded
        );
        assert_eq!(
            controller.get_environment(Environment::Staging).live,
            deployment.revision
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_crashed_hook_process_rolls_back() {
        let controller = Arc::new(TrafficController::new(
            Arc::new(FakeProvisioner { fail: false }),
            Arc::new(CommandHookInvoker::new("false", "http://127.0.0.1:9")),
            ShiftPolicy::AllAtOnce,
            Duration::from_secs(3600),
        ));

        let (_, rx) = controller.deploy(request());
        let deployment = tokio::time::timeout(Duration::from_secs(5), finish(rx))
            .await
            .expect("hook process exit was not noticed");

        assert_eq!(deployment.state, DeploymentState::RolledBack);
        assert!(!deployment.hook_execution.unwrap().timed_out);
        assert!(controller.get_environment(Environment::Staging).live.is_none());
    }

    #[tokio::test]
    async fn test_finished_deployment_is_evicted_after_retention() {
        let (events, mut rx_events) = mpsc::unbounded_channel();
        let controller = Arc::new(
            TrafficController::new(
                Arc::new(FakeProvisioner { fail: false }),
                Arc::new(ChannelHookInvoker { events }),
                ShiftPolicy::AllAtOnce,
                Duration::from_secs(5),
            )
            .with_retention(Duration::from_millis(200)),
        );

        let (id, rx) = controller.deploy(request());
        let event = rx_events.recv().await.unwrap();
        controller
            .report_hook_status(id, event.hook_execution_id, HookStatus::Succeeded)
            .unwrap();
        let deployment = finish(rx).await;
        assert!(controller.get_deployment(id).is_some());

        tokio::time::timeout(Duration::from_secs(5), async {
            while controller.get_deployment(id).is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("deployment was never evicted");

        assert_eq!(
            controller.report_hook_status(id, event.hook_execution_id, HookStatus::Failed),
            Err(TrafficError::NotFound(id))
        );
        // Eviction forgets the deployment, not the routing it produced
        assert_eq!(
            controller.get_environment(Environment::Staging).live,
            deployment.revision
        );
    }

    #[tokio::test]
    async fn test_pending_deployment_is_not_evicted() {
        let (controller, mut events) = controller(false, Duration::from_secs(5));
        controller.evict(Uuid::new_v4());

        let (id, _rx) = controller.deploy(request());
        events.recv().await.unwrap();

        controller.evict(id);
        assert_eq!(
            controller.get_deployment(id).unwrap().state,
            DeploymentState::ValidationPending
        );
    }
}

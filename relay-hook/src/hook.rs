//! Pre-traffic validation state machine
//!
//! Steps run strictly in order; the first failing step ends validation. The
//! status report is issued on every path, exactly once.

use relay_core::domain::hook::HookStatus;
use relay_core::dto::hook::HookEvent;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::HookConfig;
use crate::error::{HookError, Result};
use crate::invoker::{HttpRevisionInvoker, RevisionInvoker};
use crate::record::{HttpRecordStore, ReadConsistency, RecordStore, SyntheticRecord, TracedRecordStore};
use crate::reporter::{OrchestratorReporter, StatusReporter};
use relay_client::OrchestratorClient;

/// Named steps of a hook execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStep {
    Setup,
    Invoke,
    PropagationWait,
    ConsistencyRead,
    Cleanup,
    Report,
}

impl std::fmt::Display for HookStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HookStep::Setup => "setup",
            HookStep::Invoke => "invoke",
            HookStep::PropagationWait => "propagation-wait",
            HookStep::ConsistencyRead => "consistency-read",
            HookStep::Cleanup => "cleanup",
            HookStep::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// Result of a reported hook execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookOutcome {
    pub status: HookStatus,
    pub failed_step: Option<HookStep>,
    pub failure: Option<String>,
}

/// Reports `Failed` for an execution whose hook could not be constructed
///
/// The controller is waiting on this execution, so a setup error must end in
/// a report like any other validation failure.
pub async fn report_setup_failure(
    reporter: &dyn StatusReporter,
    event: &HookEvent,
    failure: &HookError,
) -> Result<HookOutcome> {
    error!(
        "Pre-traffic hook for deployment {} failed at {}: {}",
        event.deployment_id,
        HookStep::Setup,
        failure
    );

    reporter
        .report(event.deployment_id, event.hook_execution_id, HookStatus::Failed)
        .await
        .inspect_err(|e| error!("{}: {}", HookStep::Report, e))?;

    Ok(HookOutcome {
        status: HookStatus::Failed,
        failed_step: Some(HookStep::Setup),
        failure: Some(failure.to_string()),
    })
}

/// The pre-traffic validation hook
pub struct PreTrafficHook {
    invoker: Arc<dyn RevisionInvoker>,
    store: Arc<dyn RecordStore>,
    reporter: Arc<dyn StatusReporter>,
    table: String,
    propagation_wait: Duration,
    record: SyntheticRecord,
}

impl PreTrafficHook {
    /// Creates a hook from explicit collaborators
    pub fn new(
        invoker: Arc<dyn RevisionInvoker>,
        store: Arc<dyn RecordStore>,
        reporter: Arc<dyn StatusReporter>,
        table: impl Into<String>,
        propagation_wait: Duration,
    ) -> Self {
        Self {
            invoker,
            store,
            reporter,
            table: table.into(),
            propagation_wait,
            record: SyntheticRecord::default(),
        }
    }

    /// Creates a hook wired to the HTTP collaborators described by `config`
    pub fn from_config(config: &HookConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| HookError::Config(format!("failed to build HTTP client: {}", e)))?;

        let store = TracedRecordStore::new(HttpRecordStore::new(
            client.clone(),
            config.service_url.clone(),
        ));
        let reporter = OrchestratorReporter::new(OrchestratorClient::with_client(
            config.orchestrator_url.clone(),
            client.clone(),
        ));

        Ok(Self::new(
            Arc::new(HttpRevisionInvoker::new(client)),
            Arc::new(store),
            Arc::new(reporter),
            config.record_table.clone(),
            config.propagation_wait,
        ))
    }

    /// Replaces the synthetic record
    pub fn with_record(mut self, record: SyntheticRecord) -> Self {
        self.record = record;
        self
    }

    /// Runs one hook execution and reports its status
    ///
    /// Validation runs on its own task so that even a panic inside a
    /// collaborator is converted into a `Failed` report. The only error
    /// returned is a failure to deliver that report.
    pub async fn handle(self: &Arc<Self>, event: HookEvent) -> Result<HookOutcome> {
        info!(
            "Entering pre-traffic hook for deployment {} (execution {})",
            event.deployment_id, event.hook_execution_id
        );

        let hook = Arc::clone(self);
        let revision_url = event.revision_url.clone();
        let validation = tokio::spawn(async move { hook.validate(revision_url.as_deref()).await });

        let outcome = match validation.await {
            Ok(Ok(())) => HookOutcome {
                status: HookStatus::Succeeded,
                failed_step: None,
                failure: None,
            },
            Ok(Err((step, e))) => {
                error!("Pre-traffic validation failed at {}: {}", step, e);
                HookOutcome {
                    status: HookStatus::Failed,
                    failed_step: Some(step),
                    failure: Some(e.to_string()),
                }
            }
            Err(e) => {
                error!("Pre-traffic validation task aborted: {}", e);
                HookOutcome {
                    status: HookStatus::Failed,
                    failed_step: None,
                    failure: Some(format!("validation task aborted: {}", e)),
                }
            }
        };

        self.reporter
            .report(event.deployment_id, event.hook_execution_id, outcome.status)
            .await
            .inspect_err(|e| error!("{}: {}", HookStep::Report, e))?;

        info!(
            "Reported {} for hook execution {}",
            outcome.status, event.hook_execution_id
        );

        Ok(outcome)
    }

    async fn validate(&self, revision_url: Option<&str>) -> std::result::Result<(), (HookStep, HookError)> {
        let revision_url = revision_url.ok_or_else(|| {
            (
                HookStep::Invoke,
                HookError::Invoke("deployment has no revision url".to_string()),
            )
        })?;

        info!("Testing new revision at {}", revision_url);
        self.invoker
            .invoke_write(revision_url, &self.record)
            .await
            .map_err(|e| (HookStep::Invoke, e))?;

        // Single bounded wait for replication, not a retry loop
        info!(
            "{}: waiting {:?} before reading back",
            HookStep::PropagationWait,
            self.propagation_wait
        );
        tokio::time::sleep(self.propagation_wait).await;

        let key = self.record.key();
        let found = self
            .store
            .get(&self.table, key, ReadConsistency::Strong)
            .await
            .map_err(|e| (HookStep::ConsistencyRead, e))?;

        if found.is_none() {
            return Err((
                HookStep::ConsistencyRead,
                HookError::ReadMiss {
                    table: self.table.clone(),
                    key: key.to_string(),
                },
            ));
        }

        // Lenient cleanup: a failed delete is logged, not surfaced
        match self
            .store
            .delete(&self.table, key, ReadConsistency::Eventual)
            .await
        {
            Ok(()) => info!("Synthetic record deleted"),
            Err(e) => warn!("{} failed, leaving synthetic record behind: {}", HookStep::Cleanup, e),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value as JsonValue;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeStore {
        records: Mutex<HashMap<String, JsonValue>>,
        deletes: Mutex<Vec<ReadConsistency>>,
        fail_delete: bool,
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn get(&self, _: &str, key: &str, consistency: ReadConsistency) -> Result<Option<JsonValue>> {
            assert_eq!(consistency, ReadConsistency::Strong);
            Ok(self.records.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, _: &str, key: &str, consistency: ReadConsistency) -> Result<()> {
            self.deletes.lock().unwrap().push(consistency);
            if self.fail_delete {
                return Err(HookError::Store("throttled".to_string()));
            }
            self.records.lock().unwrap().remove(key);
            Ok(())
        }
    }

    enum InvokeBehavior {
        Persist,
        Drop,
        Fail,
        Panic,
    }

    struct FakeInvoker {
        store: Arc<FakeStore>,
        behavior: InvokeBehavior,
    }

    #[async_trait]
    impl RevisionInvoker for FakeInvoker {
        async fn invoke_write(&self, _: &str, record: &SyntheticRecord) -> Result<()> {
            match self.behavior {
                InvokeBehavior::Persist => {
                    self.store.records.lock().unwrap().insert(
                        record.key().to_string(),
                        serde_json::to_value(record).unwrap(),
                    );
                    Ok(())
                }
                InvokeBehavior::Drop => Ok(()),
                InvokeBehavior::Fail => Err(HookError::Invoke("502 Bad Gateway".to_string())),
                InvokeBehavior::Panic => panic!("revision handler crashed"),
            }
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        reports: Mutex<Vec<(Uuid, Uuid, HookStatus)>>,
        fail: bool,
    }

    #[async_trait]
    impl StatusReporter for RecordingReporter {
        async fn report(&self, deployment_id: Uuid, execution_id: Uuid, status: HookStatus) -> Result<()> {
            self.reports
                .lock()
                .unwrap()
                .push((deployment_id, execution_id, status));
            if self.fail {
                return Err(HookError::Report("connection refused".to_string()));
            }
            Ok(())
        }
    }

    fn event() -> HookEvent {
        HookEvent {
            deployment_id: Uuid::new_v4(),
            hook_execution_id: Uuid::new_v4(),
            revision_url: Some("http://revision.local".to_string()),
        }
    }

    fn hook(
        store: Arc<FakeStore>,
        behavior: InvokeBehavior,
        reporter: Arc<RecordingReporter>,
    ) -> Arc<PreTrafficHook> {
        let invoker = FakeInvoker {
            store: Arc::clone(&store),
            behavior,
        };
        Arc::new(PreTrafficHook::new(
            Arc::new(invoker),
            store,
            reporter,
            "customers",
            Duration::from_millis(20),
        ))
    }

    #[tokio::test]
    async fn test_successful_validation_reports_once_and_cleans_up() {
        let store = Arc::new(FakeStore::default());
        let reporter = Arc::new(RecordingReporter::default());
        let hook = hook(Arc::clone(&store), InvokeBehavior::Persist, Arc::clone(&reporter));
        let event = event();

        let started = std::time::Instant::now();
        let outcome = hook.handle(event.clone()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(20));
        assert_eq!(outcome.status, HookStatus::Succeeded);
        assert!(store.records.lock().unwrap().is_empty());
        assert_eq!(
            *store.deletes.lock().unwrap(),
            vec![ReadConsistency::Eventual]
        );

        let reports = reporter.reports.lock().unwrap();
        assert_eq!(
            *reports,
            vec![(event.deployment_id, event.hook_execution_id, HookStatus::Succeeded)]
        );
    }

    #[tokio::test]
    async fn test_invoke_failure_reports_failed() {
        let store = Arc::new(FakeStore::default());
        let reporter = Arc::new(RecordingReporter::default());
        let hook = hook(store, InvokeBehavior::Fail, Arc::clone(&reporter));

        let outcome = hook.handle(event()).await.unwrap();

        assert_eq!(outcome.status, HookStatus::Failed);
        assert_eq!(outcome.failed_step, Some(HookStep::Invoke));
        assert_eq!(reporter.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_miss_reports_failed() {
        let store = Arc::new(FakeStore::default());
        let reporter = Arc::new(RecordingReporter::default());
        let hook = hook(store, InvokeBehavior::Drop, Arc::clone(&reporter));

        let outcome = hook.handle(event()).await.unwrap();

        assert_eq!(outcome.status, HookStatus::Failed);
        assert_eq!(outcome.failed_step, Some(HookStep::ConsistencyRead));
        assert_eq!(
            reporter.reports.lock().unwrap()[0].2,
            HookStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_lenient() {
        let store = Arc::new(FakeStore {
            fail_delete: true,
            ..Default::default()
        });
        let reporter = Arc::new(RecordingReporter::default());
        let hook = hook(Arc::clone(&store), InvokeBehavior::Persist, Arc::clone(&reporter));

        let outcome = hook.handle(event()).await.unwrap();

        assert_eq!(outcome.status, HookStatus::Succeeded);
        assert_eq!(store.records.lock().unwrap().len(), 1);
        assert_eq!(reporter.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_panic_still_reports_failed_once() {
        let store = Arc::new(FakeStore::default());
        let reporter = Arc::new(RecordingReporter::default());
        let hook = hook(store, InvokeBehavior::Panic, Arc::clone(&reporter));

        let outcome = hook.handle(event()).await.unwrap();

        assert_eq!(outcome.status, HookStatus::Failed);
        let reports = reporter.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].2, HookStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_revision_url_reports_failed() {
        let store = Arc::new(FakeStore::default());
        let reporter = Arc::new(RecordingReporter::default());
        let hook = hook(store, InvokeBehavior::Persist, Arc::clone(&reporter));

        let mut event = event();
        event.revision_url = None;
        let outcome = hook.handle(event).await.unwrap();

        assert_eq!(outcome.status, HookStatus::Failed);
        assert_eq!(outcome.failed_step, Some(HookStep::Invoke));
    }

    #[tokio::test]
    async fn test_setup_failure_reports_failed_once() {
        let reporter = RecordingReporter::default();
        let event = event();

        let config = HookConfig::new(
            "http://localhost:8080".to_string(),
            "localhost:3000".to_string(),
        );
        let failure = PreTrafficHook::from_config(&config)
            .err()
            .expect("invalid service url must be rejected");

        let outcome = report_setup_failure(&reporter, &event, &failure)
            .await
            .unwrap();

        assert_eq!(outcome.status, HookStatus::Failed);
        assert_eq!(outcome.failed_step, Some(HookStep::Setup));
        assert!(outcome.failure.unwrap().contains("service_url"));
        assert_eq!(
            *reporter.reports.lock().unwrap(),
            vec![(event.deployment_id, event.hook_execution_id, HookStatus::Failed)]
        );
    }

    #[tokio::test]
    async fn test_setup_failure_report_error_is_returned() {
        let reporter = RecordingReporter {
            fail: true,
            ..Default::default()
        };
        let failure = HookError::Config("SERVICE_URL environment variable not set".to_string());

        let result = report_setup_failure(&reporter, &event(), &failure).await;

        assert!(matches!(result, Err(HookError::Report(_))));
        assert_eq!(reporter.reports.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_report_failure_is_fatal() {
        let store = Arc::new(FakeStore::default());
        let reporter = Arc::new(RecordingReporter {
            fail: true,
            ..Default::default()
        });
        let hook = hook(store, InvokeBehavior::Persist, Arc::clone(&reporter));

        let result = hook.handle(event()).await;

        assert!(matches!(result, Err(HookError::Report(_))));
        assert_eq!(reporter.reports.lock().unwrap().len(), 1);
    }
}

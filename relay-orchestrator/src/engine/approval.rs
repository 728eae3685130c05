//! Approval Gate
//!
//! A pure suspension point: the approval action parks on a oneshot channel
//! until an operator decision arrives. There is no timeout; cancelling the
//! run drops the gate. A run's gates are released once it stops, so nothing
//! is kept for finished runs.

use async_trait::async_trait;
use chrono::Utc;
use relay_core::domain::approval::{ApprovalDecision, ApprovalRecord};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::info;
use uuid::Uuid;

use crate::executor::{ActionContext, ActionExecutor, ActionOutput, ExecutorError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("run {run_id} is not awaiting approval in stage '{stage}'")]
    NotAwaiting { run_id: Uuid, stage: String },

    #[error("stage '{stage}' of run {run_id} has already been decided")]
    AlreadyDecided { run_id: Uuid, stage: String },
}

type GateKey = (Uuid, String);

struct PendingGate {
    action: String,
    decision: oneshot::Sender<ApprovalRecord>,
}

#[derive(Default)]
pub struct ApprovalGate {
    pending: Mutex<HashMap<GateKey, PendingGate>>,
    decided: Mutex<HashSet<GateKey>>,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspends until a decision is submitted for the stage
    pub async fn await_approval(
        &self,
        run_id: Uuid,
        stage: &str,
        action: &str,
    ) -> Result<ApprovalRecord, ExecutorError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(
            (run_id, stage.to_string()),
            PendingGate {
                action: action.to_string(),
                decision: tx,
            },
        );

        info!("Run {} paused for approval at stage '{}'", run_id, stage);
        rx.await.map_err(|_| ExecutorError::Cancelled)
    }

    /// Records the single decision for a paused stage
    pub fn submit(
        &self,
        run_id: Uuid,
        stage: &str,
        decision: ApprovalDecision,
        comment: String,
    ) -> Result<ApprovalRecord, GateError> {
        let key = (run_id, stage.to_string());

        if self.decided.lock().unwrap().contains(&key) {
            return Err(GateError::AlreadyDecided {
                run_id,
                stage: stage.to_string(),
            });
        }

        let not_awaiting = || GateError::NotAwaiting {
            run_id,
            stage: stage.to_string(),
        };
        let gate = self
            .pending
            .lock()
            .unwrap()
            .remove(&key)
            .ok_or_else(not_awaiting)?;

        let record = ApprovalRecord {
            run_id,
            stage: stage.to_string(),
            action: gate.action,
            decision,
            comment,
            decided_at: Utc::now(),
        };

        // The waiting action may have been aborted in the meantime
        gate.decision
            .send(record.clone())
            .map_err(|_| not_awaiting())?;
        self.decided.lock().unwrap().insert(key);

        info!(
            "Stage '{}' of run {} {}",
            stage,
            run_id,
            match decision {
                ApprovalDecision::Approved => "approved",
                ApprovalDecision::Rejected => "rejected",
            }
        );
        Ok(record)
    }

    /// Drops every gate of a run, pending or decided
    ///
    /// Pending waiters resume with `Cancelled`.
    pub fn release_run(&self, run_id: Uuid) {
        self.pending
            .lock()
            .unwrap()
            .retain(|(id, _), _| *id != run_id);
        self.decided
            .lock()
            .unwrap()
            .retain(|(id, _)| *id != run_id);
    }

    pub fn is_awaiting(&self, run_id: Uuid, stage: &str) -> bool {
        self.pending
            .lock()
            .unwrap()
            .contains_key(&(run_id, stage.to_string()))
    }
}

#[async_trait]
impl ActionExecutor for ApprovalGate {
    async fn execute(&self, ctx: ActionContext) -> Result<ActionOutput, ExecutorError> {
        let record = self
            .await_approval(ctx.run_id, &ctx.stage, &ctx.action.name)
            .await?;

        if !record.is_approved() {
            return Err(ExecutorError::ApprovalRejected(record));
        }

        Ok(ActionOutput {
            approval: Some(record),
            ..Default::default()
        })
    }
}

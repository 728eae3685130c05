//! Run API Handlers
//!
//! HTTP endpoints for the run lifecycle and approval decisions.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use relay_core::domain::approval::ApprovalRecord;
use relay_core::domain::run::Run;
use relay_core::dto::approval::SubmitApproval;
use relay_core::dto::run::{RunSummary, StartRun};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /run/start
/// Start a run for an explicit source reference
pub async fn start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRun>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    tracing::info!("Starting run for branch: {}", req.source_ref.branch);

    let run = state.orchestrator.start_run(req.source_ref).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

/// GET /run/list
pub async fn list_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<RunSummary>>> {
    tracing::debug!("Listing runs");

    let runs = state.orchestrator.list_runs().await?;
    Ok(Json(runs.into_iter().map(RunSummary::from).collect()))
}

/// GET /run/{id}
pub async fn get_run(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Run>> {
    tracing::debug!("Getting run: {}", id);

    Ok(Json(state.orchestrator.get_run(id).await?))
}

/// POST /run/{id}/cancel
pub async fn cancel_run(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Run>> {
    tracing::info!("Cancelling run: {}", id);

    Ok(Json(state.orchestrator.cancel_run(id).await?))
}

/// POST /run/{id}/retry
/// Re-run the failed stage from its start
pub async fn retry_run(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Run>> {
    tracing::info!("Retrying run: {}", id);

    Ok(Json(state.orchestrator.retry_run(id).await?))
}

/// POST /run/{id}/approval
/// Record the decision for a stage paused at an approval gate
pub async fn submit_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitApproval>,
) -> ApiResult<Json<ApprovalRecord>> {
    tracing::info!(
        "Approval decision {} for stage '{}' of run {}",
        req.decision,
        req.stage,
        id
    );

    Ok(Json(state.orchestrator.submit_approval(id, req).await?))
}

//! Deployment API Handlers
//!
//! Deployment state, environment routing and the hook status report.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use relay_core::domain::deployment::{Deployment, Environment, EnvironmentAlias};
use relay_core::dto::hook::ReportHookStatus;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// GET /deployment/{id}
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    tracing::debug!("Getting deployment: {}", id);

    state
        .traffic
        .get_deployment(id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Deployment {} not found", id)))
}

/// PUT /deployment/{id}/hook/{execution_id}
/// Single status report of a pre-traffic hook execution
pub async fn report_hook_status(
    State(state): State<AppState>,
    Path((id, execution_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ReportHookStatus>,
) -> ApiResult<StatusCode> {
    tracing::info!(
        "Hook {} of deployment {} reported {}",
        execution_id,
        id,
        req.status
    );

    state.traffic.report_hook_status(id, execution_id, req.status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /environment/{name}
/// Current routing of an environment
pub async fn get_environment(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<EnvironmentAlias>> {
    let environment: Environment = name.parse().map_err(ApiError::BadRequest)?;
    Ok(Json(state.traffic.get_environment(environment)))
}

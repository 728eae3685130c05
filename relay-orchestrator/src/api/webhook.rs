//! Change-notification endpoint

use axum::{Json, extract::State, http::StatusCode};
use relay_core::dto::trigger::{PushEvent, TriggerResponse};

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /webhook
/// Start a run when the pushed branch is the trigger branch
pub async fn push(
    State(state): State<AppState>,
    Json(event): Json<PushEvent>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    tracing::debug!("Received push for {}", event.git_ref);

    let response = state.orchestrator.push(event).await?;
    let status = if response.triggered {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((status, Json(response)))
}

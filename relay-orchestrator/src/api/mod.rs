//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod deployment;
pub mod error;
pub mod health;
pub mod run;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::engine::Orchestrator;
use crate::traffic::TrafficController;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub traffic: Arc<TrafficController>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Trigger
        .route("/webhook", post(webhook::push))
        // Run endpoints
        .route("/run/start", post(run::start_run))
        .route("/run/list", get(run::list_runs))
        .route("/run/{id}", get(run::get_run))
        .route("/run/{id}/cancel", post(run::cancel_run))
        .route("/run/{id}/retry", post(run::retry_run))
        .route("/run/{id}/approval", post(run::submit_approval))
        // Deployment endpoints
        .route("/deployment/{id}", get(deployment::get_deployment))
        .route(
            "/deployment/{id}/hook/{execution_id}",
            put(deployment::report_hook_status),
        )
        .route("/environment/{name}", get(deployment::get_environment));

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .nest("/api", api)
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use relay_core::domain::hook::HookStatus;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::engine::Executors;
    use crate::executor::{ActionContext, ActionExecutor, ActionOutput, ExecutorError};
    use crate::pipeline::default_pipeline;
    use crate::repository::InMemoryRunRepository;
    use crate::traffic::testing::auto_reporting_controller;

    struct NoopExecutor;

    #[async_trait]
    impl ActionExecutor for NoopExecutor {
        async fn execute(&self, _: ActionContext) -> Result<ActionOutput, ExecutorError> {
            Ok(ActionOutput::default())
        }
    }

    fn app() -> Router {
        let noop: Arc<dyn ActionExecutor> = Arc::new(NoopExecutor);
        let orchestrator = Arc::new(Orchestrator::new(
            default_pipeline("main", "bkt"),
            "main",
            Arc::new(InMemoryRunRepository::new()),
            Executors {
                source: noop.clone(),
                build: noop.clone(),
                deploy: noop,
            },
        ));

        create_router(AppState {
            orchestrator,
            traffic: auto_reporting_controller(HookStatus::Succeeded),
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_start_and_fetch_run() {
        let app = app();

        let (status, run) = send(
            &app,
            "POST",
            "/api/run/start",
            Some(json!({ "source_ref": { "branch": "main", "commit": "abc123" } })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = run["id"].as_str().unwrap().to_string();

        let (status, fetched) = send(&app, "GET", &format!("/api/run/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["source_ref"]["branch"], "main");

        let (status, list) = send(&app, "GET", "/api/run/list", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["branch"], "main");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let app = app();

        let (status, body) = send(&app, "GET", &format!("/api/run/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let (status, _) = send(
            &app,
            "POST",
            "/api/run/start",
            Some(json!({ "source_ref": { "branch": "develop" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, run) = send(
            &app,
            "POST",
            "/api/run/start",
            Some(json!({ "source_ref": { "branch": "main" } })),
        )
        .await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/run/{}/approval", run["id"].as_str().unwrap()),
            Some(json!({ "stage": "Staging", "decision": "Approved" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, "GET", "/api/environment/qa", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_branches() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/webhook",
            Some(json!({ "ref": "refs/heads/feature/x", "after": "abc123" })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["triggered"], false);

        let (status, body) = send(
            &app,
            "POST",
            "/api/webhook",
            Some(json!({ "ref": "refs/heads/main", "after": "abc123" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["triggered"], true);
    }

    #[tokio::test]
    async fn test_deployment_endpoints() {
        let app = app();

        let (status, alias) = send(&app, "GET", "/api/environment/staging", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(alias["environment"], "staging");
        assert!(alias["live"].is_null());

        let (status, _) = send(&app, "GET", &format!("/api/deployment/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/api/deployment/{}/hook/{}", Uuid::new_v4(), Uuid::new_v4()),
            Some(json!({ "status": "Succeeded" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

//! Axum router configuration with middleware.
//!
//! All workflow routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/workflows",
            post(handlers::workflow::create_workflow).get(handlers::workflow::list_workflows),
        )
        .route("/workflows/{id}", get(handlers::workflow::get_workflow))
        .route(
            "/workflows/{id}/history",
            get(handlers::workflow::get_history),
        )
        .route(
            "/workflows/{id}/history/{version}",
            get(handlers::workflow::get_checkpoint),
        )
        .route(
            "/workflows/{id}/resume",
            post(handlers::workflow::resume_workflow),
        )
        .route(
            "/workflows/{id}/feedback",
            post(handlers::workflow::submit_feedback),
        )
        .route(
            "/workflows/{id}/cancel",
            post(handlers::workflow::cancel_workflow),
        )
        .route("/recover", post(handlers::workflow::recover_workflows));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness check.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use reforge_types::workflow::WorkflowId;
    use tower::ServiceExt;

    use crate::state::test_support::offline_state;

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Poll until the workflow reports `status` and no task is driving it.
    async fn wait_for(state: &AppState, router: &Router, id: &str, status: &str) -> Value {
        let workflow_id: WorkflowId = id.parse().unwrap();
        for _ in 0..200 {
            let (_, body) = send(router, "GET", &format!("/api/v1/workflows/{id}"), None).await;
            if body["data"]["status"] == status && !state.coordinator.is_active(&workflow_id) {
                return body["data"].clone();
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("workflow {id} never reached {status}");
    }

    async fn create(router: &Router) -> String {
        let (status, body) = send(
            router,
            "POST",
            "/api/v1/workflows",
            Some(json!({
                "goal": "rename variables",
                "files": {"src/app.py": "x = 1\n"},
                "max_iterations": 2
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["workflow_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = offline_state().await;
        let router = build_router(state.clone());
        let (status, body) = send(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_parks_then_approve_completes() {
        let (state, _dir) = offline_state().await;
        let router = build_router(state.clone());
        let id = create(&router).await;

        let parked = wait_for(&state, &router, &id, "AWAITING_REVIEW").await;
        assert_eq!(parked["refactoring_goal"], "rename variables");
        assert_eq!(parked["partial"], true);

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/workflows/{id}/resume"),
            Some(json!({"action": "approve"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "COMMITTING");

        wait_for(&state, &router, &id, "COMPLETED").await;
        let committed = state
            .data_dir
            .join("output")
            .join(&id)
            .join("src/app.py");
        assert_eq!(std::fs::read_to_string(committed).unwrap(), "x = 1\n");

        let (status, body) =
            send(&router, "GET", &format!("/api/v1/workflows/{id}/history"), None).await;
        assert_eq!(status, StatusCode::OK);
        let statuses: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["status"].as_str().unwrap())
            .collect();
        assert_eq!(statuses.first(), Some(&"PENDING"));
        assert_eq!(statuses.last(), Some(&"COMPLETED"));
    }

    #[tokio::test]
    async fn test_resume_outside_review_conflicts() {
        let (state, _dir) = offline_state().await;
        let router = build_router(state.clone());
        let id = create(&router).await;
        wait_for(&state, &router, &id, "AWAITING_REVIEW").await;

        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/v1/workflows/{id}/resume"),
            Some(json!({"action": "reject"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/workflows/{id}/resume"),
            Some(json!({"action": "approve"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errors"][0]["code"], "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_feedback_then_cancel() {
        let (state, _dir) = offline_state().await;
        let router = build_router(state.clone());
        let id = create(&router).await;
        wait_for(&state, &router, &id, "AWAITING_REVIEW").await;

        let (status, body) = send(
            &router,
            "POST",
            &format!("/api/v1/workflows/{id}/feedback"),
            Some(json!({"feedback": "keep the public names"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pending_feedback"], "keep the public names");

        let (status, body) =
            send(&router, "POST", &format!("/api/v1/workflows/{id}/cancel"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "cancelled");
        assert_eq!(body["data"]["workflow"]["status"], "CANCELLED");

        let (status, _) =
            send(&router, "POST", &format!("/api/v1/workflows/{id}/cancel"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let (state, _dir) = offline_state().await;
        let router = build_router(state.clone());

        let (status, _) = send(
            &router,
            "POST",
            "/api/v1/workflows",
            Some(json!({"goal": "  ", "files": {"a.py": "x"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            "POST",
            "/api/v1/workflows",
            Some(json!({"goal": "tidy", "files": {"../etc/passwd": "x"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, "GET", "/api/v1/workflows?status=SLEEPING", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = uuid::Uuid::now_v7();
        let (status, body) =
            send(&router, "GET", &format!("/api/v1/workflows/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "WORKFLOW_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_normalizes_file_keys() {
        let (state, _dir) = offline_state().await;
        let router = build_router(state.clone());

        let (status, body) = send(
            &router,
            "POST",
            "/api/v1/workflows",
            Some(json!({"goal": "tidy", "files": {"./src/./app.py": "x = 1\n"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["data"]["workflow_id"].as_str().unwrap().to_string();
        wait_for(&state, &router, &id, "AWAITING_REVIEW").await;
        let stored = state.coordinator.state(id.parse().unwrap()).await.unwrap();
        assert_eq!(stored.files.keys().collect::<Vec<_>>(), vec!["src/app.py"]);

        for files in [json!({".": "x"}), json!({"a.py": "x", "./a.py": "y"})] {
            let (status, _) = send(
                &router,
                "POST",
                "/api/v1/workflows",
                Some(json!({"goal": "tidy", "files": files})),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let (state, _dir) = offline_state().await;
        let router = build_router(state.clone());
        let id = create(&router).await;
        wait_for(&state, &router, &id, "AWAITING_REVIEW").await;

        let (_, body) =
            send(&router, "GET", "/api/v1/workflows?status=AWAITING_REVIEW", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (_, body) = send(&router, "GET", "/api/v1/workflows?status=COMPLETED", None).await;
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}

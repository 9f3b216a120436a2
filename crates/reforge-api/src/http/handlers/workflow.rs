//! Workflow control and inspection handlers for the REST API.
//!
//! Create and resume apply their first transition synchronously and hand the
//! rest of the run to a background task, so callers poll `GET
//! /workflows/{id}` to follow progress.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reforge_core::workflow::coordinator::{CancelOutcome, NewWorkflow, RecoveryReport};
use reforge_infra::filesystem::normalize_relative;
use reforge_types::workflow::{
    CheckpointRecord, ReviewAction, ReviewDecision, WorkflowId, WorkflowStatus, WorkflowSummary,
    WorkflowView,
};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub goal: String,
    /// Path to file content.
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    /// `approve` or `reject`, case-insensitive.
    pub action: String,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// `cancelled` when the workflow was idle, `requested` when a running
    /// loop will stop before its next node.
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowView>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/workflows - Create a workflow and start driving it.
pub async fn create_workflow(
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WorkflowView>>), AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let mut files = BTreeMap::new();
    for (path, content) in body.files {
        let Some(key) = normalize_relative(&path) else {
            return Err(AppError::Validation(format!(
                "file path must be relative and stay inside the project: {path}"
            )));
        };
        if files.insert(key, content).is_some() {
            return Err(AppError::Validation(format!(
                "file path given more than once: {path}"
            )));
        }
    }

    let created = state
        .coordinator
        .create(NewWorkflow {
            goal: body.goal,
            files,
            max_iterations: body.max_iterations,
        })
        .await?;
    let id = created.workflow_id;
    spawn_drive(&state, id);

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(created.view(), request_id, elapsed)
        .with_link("self", &format!("/api/v1/workflows/{id}"))
        .with_link("history", &format!("/api/v1/workflows/{id}/history"));

    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/workflows - List workflows, newest first.
pub async fn list_workflows(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<WorkflowSummary>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let status = query
        .status
        .as_deref()
        .map(str::parse::<WorkflowStatus>)
        .transpose()
        .map_err(AppError::Validation)?;
    let summaries = state.coordinator.list(status).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp =
        ApiResponse::success(summaries, request_id, elapsed).with_link("self", "/api/v1/workflows");
    Ok(Json(resp))
}

/// GET /api/v1/workflows/{id} - Status projection of one workflow.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let id = WorkflowId::from_uuid(id);

    let view = state.coordinator.status(id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(view, request_id, elapsed)
        .with_link("self", &format!("/api/v1/workflows/{id}"));
    Ok(Json(resp))
}

/// GET /api/v1/workflows/{id}/history - Checkpoint history, oldest first.
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<CheckpointRecord>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let id = WorkflowId::from_uuid(id);

    let history = state.coordinator.history(id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(history, request_id, elapsed)
        .with_link("workflow", &format!("/api/v1/workflows/{id}"));
    Ok(Json(resp))
}

/// GET /api/v1/workflows/{id}/history/{version} - One historical checkpoint.
pub async fn get_checkpoint(
    State(state): State<AppState>,
    Path((id, version)): Path<(Uuid, u64)>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let id = WorkflowId::from_uuid(id);

    let snapshot = state.coordinator.checkpoint(id, version).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(snapshot.view(), request_id, elapsed)
        .with_link("workflow", &format!("/api/v1/workflows/{id}"));
    Ok(Json(resp))
}

/// POST /api/v1/workflows/{id}/resume - Approve or reject a parked workflow.
pub async fn resume_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResumeRequest>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let id = WorkflowId::from_uuid(id);

    let action: ReviewAction = body.action.parse().map_err(AppError::Validation)?;
    let decision = ReviewDecision {
        action,
        feedback: body.feedback,
    };
    let reviewed = state.coordinator.review(id, decision).await?;
    if !reviewed.status.is_terminal() {
        spawn_drive(&state, id);
    }

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(reviewed.view(), request_id, elapsed)
        .with_link("self", &format!("/api/v1/workflows/{id}"));
    Ok(Json(resp))
}

/// POST /api/v1/workflows/{id}/feedback - Queue feedback for the next reject.
pub async fn submit_feedback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Json<ApiResponse<WorkflowView>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let id = WorkflowId::from_uuid(id);

    let updated = state.coordinator.submit_feedback(id, body.feedback).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(updated.view(), request_id, elapsed)
        .with_link("self", &format!("/api/v1/workflows/{id}"));
    Ok(Json(resp))
}

/// POST /api/v1/workflows/{id}/cancel - Cancel a non-terminal workflow.
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CancelResponse>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();
    let id = WorkflowId::from_uuid(id);

    let body = match state.coordinator.cancel(id).await? {
        CancelOutcome::Cancelled(cancelled) => CancelResponse {
            outcome: "cancelled",
            workflow: Some(cancelled.view()),
        },
        CancelOutcome::Requested => CancelResponse {
            outcome: "requested",
            workflow: None,
        },
    };

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(body, request_id, elapsed)
        .with_link("workflow", &format!("/api/v1/workflows/{id}"));
    Ok(Json(resp))
}

/// POST /api/v1/recover - Re-drive every workflow left mid-cycle.
pub async fn recover_workflows(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RecoveryReport>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let report = state.coordinator.recover().await?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(report, request_id, elapsed)))
}

/// Drive `id` on a background task until it parks or terminates.
fn spawn_drive(state: &AppState, id: WorkflowId) {
    let coordinator = state.coordinator.clone();
    tokio::spawn(async move {
        match coordinator.drive(id).await {
            Ok(finished) => {
                tracing::debug!(workflow_id = %id, status = %finished.status, "background drive finished");
            }
            Err(e) => {
                tracing::warn!(workflow_id = %id, error = %e, "background drive failed");
            }
        }
    });
}

//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use reforge_core::workflow::coordinator::WorkflowError;
use reforge_core::workflow::engine::TransitionError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Workflow(WorkflowError),
    /// Request body or query rejected before reaching the coordinator.
    Validation(String),
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        AppError::Workflow(e)
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Workflow(e @ WorkflowError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "WORKFLOW_NOT_FOUND", e.to_string())
            }
            AppError::Workflow(WorkflowError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Workflow(e @ WorkflowError::InvalidTransition(TransitionError::EmptyFeedback)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::InvalidTransition(_)) => {
                (StatusCode::CONFLICT, "INVALID_TRANSITION", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::AlreadyRunning(_)) => {
                (StatusCode::CONFLICT, "WORKFLOW_BUSY", e.to_string())
            }
            AppError::Workflow(e @ WorkflowError::Persistence(_)) => {
                tracing::error!(error = %e, "request failed on persistence");
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR", e.to_string())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ApiResponse::error(code, &message, Uuid::now_v7().to_string());
        (status, Json(body)).into_response()
    }
}

//! Durable checkpoint manager for workflow state.
//!
//! Wraps `CheckpointStore` with logging and a narrower error type. Every
//! state the transition engine produces passes through `persist` before the
//! coordinator acts on it, so an observer never sees a step that was not
//! durably recorded.

use reforge_types::workflow::{
    CheckpointRecord, WorkflowId, WorkflowState, WorkflowStatus, WorkflowSummary,
};

use crate::repository::checkpoint::CheckpointStore;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Generic over `S: CheckpointStore` so it works with any storage backend
/// (SQLite, in-memory map, test doubles).
pub struct CheckpointManager<S: CheckpointStore> {
    store: S,
}

impl<S: CheckpointStore> CheckpointManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Write `state` as the new current checkpoint.
    pub async fn persist(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        self.store.save(state).await.map_err(|e| {
            tracing::error!(
                workflow_id = %state.workflow_id,
                status = %state.status,
                version = state.version,
                error = %e,
                "failed to persist checkpoint"
            );
            CheckpointError::Repository(e.to_string())
        })?;

        tracing::debug!(
            workflow_id = %state.workflow_id,
            status = %state.status,
            version = state.version,
            "checkpointed workflow state"
        );
        Ok(())
    }

    /// Load the latest checkpoint, failing if the workflow does not exist.
    pub async fn load(&self, id: &WorkflowId) -> Result<WorkflowState, CheckpointError> {
        self.store
            .load(id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::NotFound(*id))
    }

    pub async fn list(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowSummary>, CheckpointError> {
        self.store
            .list(status)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Checkpoint history, failing if the workflow does not exist.
    pub async fn history(&self, id: &WorkflowId) -> Result<Vec<CheckpointRecord>, CheckpointError> {
        let records = self
            .store
            .history(id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;
        if records.is_empty() {
            return Err(CheckpointError::NotFound(*id));
        }
        Ok(records)
    }

    pub async fn load_version(
        &self,
        id: &WorkflowId,
        version: u64,
    ) -> Result<WorkflowState, CheckpointError> {
        self.store
            .load_version(id, version)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::NotFound(*id))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("repository error: {0}")]
    Repository(String),

    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),
}

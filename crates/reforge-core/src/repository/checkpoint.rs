//! Checkpoint store trait definition.
//!
//! Defines the storage interface for workflow state. The infrastructure layer
//! (reforge-infra) implements it with SQLite persistence and an in-memory
//! map.

use reforge_types::error::RepositoryError;
use reforge_types::workflow::{
    CheckpointRecord, WorkflowId, WorkflowState, WorkflowStatus, WorkflowSummary,
};

/// Durable persistence of workflow state, keyed by workflow ID.
///
/// `save` must be atomic per workflow: it replaces the current record and
/// appends a history entry in one unit, and a partially applied save must
/// never be observable. Stores may refuse a save whose version is not newer
/// than the stored one with `RepositoryError::Conflict`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointStore: Send + Sync {
    /// Replace the current record for `state.workflow_id` and record the
    /// snapshot in the workflow's history.
    fn save(
        &self,
        state: &WorkflowState,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load the current record.
    fn load(
        &self,
        id: &WorkflowId,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowState>, RepositoryError>> + Send;

    /// List workflows, most recently updated first, optionally filtered by status.
    fn list(
        &self,
        status: Option<WorkflowStatus>,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowSummary>, RepositoryError>> + Send;

    /// Checkpoint history for a workflow in ascending version order.
    fn history(
        &self,
        id: &WorkflowId,
    ) -> impl std::future::Future<Output = Result<Vec<CheckpointRecord>, RepositoryError>> + Send;

    /// Load the snapshot recorded at a specific version.
    fn load_version(
        &self,
        id: &WorkflowId,
        version: u64,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowState>, RepositoryError>> + Send;
}

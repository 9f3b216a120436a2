//! Checkpoint store chosen at startup.

use reforge_core::repository::checkpoint::CheckpointStore;
use reforge_types::error::RepositoryError;
use reforge_types::workflow::{
    CheckpointRecord, WorkflowId, WorkflowState, WorkflowStatus, WorkflowSummary,
};

use crate::memory::InMemoryCheckpointStore;
use crate::sqlite::checkpoint::SqliteCheckpointStore;

/// Either the durable SQLite store or the process-local one.
pub enum CheckpointBackend {
    Sqlite(SqliteCheckpointStore),
    Memory(InMemoryCheckpointStore),
}

impl CheckpointBackend {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Memory(_) => "memory",
        }
    }
}

impl CheckpointStore for CheckpointBackend {
    async fn save(&self, state: &WorkflowState) -> Result<(), RepositoryError> {
        match self {
            Self::Sqlite(store) => store.save(state).await,
            Self::Memory(store) => store.save(state).await,
        }
    }

    async fn load(&self, id: &WorkflowId) -> Result<Option<WorkflowState>, RepositoryError> {
        match self {
            Self::Sqlite(store) => store.load(id).await,
            Self::Memory(store) => store.load(id).await,
        }
    }

    async fn list(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowSummary>, RepositoryError> {
        match self {
            Self::Sqlite(store) => store.list(status).await,
            Self::Memory(store) => store.list(status).await,
        }
    }

    async fn history(&self, id: &WorkflowId) -> Result<Vec<CheckpointRecord>, RepositoryError> {
        match self {
            Self::Sqlite(store) => store.history(id).await,
            Self::Memory(store) => store.history(id).await,
        }
    }

    async fn load_version(
        &self,
        id: &WorkflowId,
        version: u64,
    ) -> Result<Option<WorkflowState>, RepositoryError> {
        match self {
            Self::Sqlite(store) => store.load_version(id, version).await,
            Self::Memory(store) => store.load_version(id, version).await,
        }
    }
}

//! In-process checkpoint store.
//!
//! Keeps the current state and checkpoint history in `DashMap`s. Nothing
//! survives the process; backs `reforge --ephemeral`.

use dashmap::DashMap;
use reforge_core::repository::checkpoint::CheckpointStore;
use reforge_types::error::RepositoryError;
use reforge_types::workflow::{
    CheckpointRecord, WorkflowId, WorkflowState, WorkflowStatus, WorkflowSummary,
};

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    current: DashMap<WorkflowId, WorkflowState>,
    history: DashMap<WorkflowId, Vec<WorkflowState>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, state: &WorkflowState) -> Result<(), RepositoryError> {
        // The history entry guard serialises writers for one workflow.
        let mut history = self.history.entry(state.workflow_id).or_default();
        if let Some(last) = history.last() {
            if last.version >= state.version {
                return Err(RepositoryError::Conflict(format!(
                    "workflow {} already has a checkpoint at or beyond version {}",
                    state.workflow_id, state.version
                )));
            }
        }
        history.push(state.clone());
        self.current.insert(state.workflow_id, state.clone());
        Ok(())
    }

    async fn load(&self, id: &WorkflowId) -> Result<Option<WorkflowState>, RepositoryError> {
        Ok(self.current.get(id).map(|entry| entry.value().clone()))
    }

    async fn list(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowSummary>, RepositoryError> {
        let mut summaries: Vec<WorkflowSummary> = self
            .current
            .iter()
            .filter(|entry| status.is_none_or(|wanted| entry.status == wanted))
            .map(|entry| entry.value().summarize())
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn history(&self, id: &WorkflowId) -> Result<Vec<CheckpointRecord>, RepositoryError> {
        let Some(states) = self.history.get(id) else {
            return Ok(Vec::new());
        };
        Ok(states
            .iter()
            .map(|s| CheckpointRecord {
                workflow_id: s.workflow_id,
                version: s.version,
                status: s.status,
                iteration_count: s.iteration_count,
                recorded_at: s.updated_at,
            })
            .collect())
    }

    async fn load_version(
        &self,
        id: &WorkflowId,
        version: u64,
    ) -> Result<Option<WorkflowState>, RepositoryError> {
        Ok(self
            .history
            .get(id)
            .and_then(|states| states.iter().find(|s| s.version == version).cloned()))
    }
}

//! Test doubles shared by the coordinator and interrupt tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use reforge_types::error::RepositoryError;
use reforge_types::workflow::{
    AnalysisSummary, CheckpointRecord, CommitReceipt, Critique, NodeKind, Proposal,
    ValidationResult, WorkflowId, WorkflowState, WorkflowStatus, WorkflowSummary,
};
use tokio::sync::Notify;

use super::engine::{NodePayload, NodeResult};
use super::node::NodeExecutor;
use crate::repository::checkpoint::CheckpointStore;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    current: HashMap<WorkflowId, WorkflowState>,
    history: HashMap<WorkflowId, Vec<WorkflowState>>,
}

/// Cloneable in-memory store; clones share the same tables so a second
/// coordinator can pick up where a dropped one left off.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn current(&self, id: &WorkflowId) -> Option<WorkflowState> {
        self.tables.lock().unwrap().current.get(id).cloned()
    }

    pub fn history_len(&self, id: &WorkflowId) -> usize {
        self.tables
            .lock()
            .unwrap()
            .history
            .get(id)
            .map_or(0, Vec::len)
    }
}

impl CheckpointStore for MemoryStore {
    fn save(&self, state: &WorkflowState) -> impl Future<Output = Result<(), RepositoryError>> + Send {
        let result = if self.fail_writes.load(Ordering::SeqCst) {
            Err(RepositoryError::Query("disk full".to_string()))
        } else {
            let mut tables = self.tables.lock().unwrap();
            tables.current.insert(state.workflow_id, state.clone());
            tables
                .history
                .entry(state.workflow_id)
                .or_default()
                .push(state.clone());
            Ok(())
        };
        async move { result }
    }

    fn load(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<Option<WorkflowState>, RepositoryError>> + Send {
        let state = self.current(id);
        async move { Ok(state) }
    }

    fn list(
        &self,
        status: Option<WorkflowStatus>,
    ) -> impl Future<Output = Result<Vec<WorkflowSummary>, RepositoryError>> + Send {
        let mut summaries: Vec<WorkflowSummary> = self
            .tables
            .lock()
            .unwrap()
            .current
            .values()
            .filter(|s| status.is_none_or(|wanted| s.status == wanted))
            .map(WorkflowState::summarize)
            .collect();
        summaries.sort_by_key(|s| s.workflow_id.0);
        async move { Ok(summaries) }
    }

    fn history(
        &self,
        id: &WorkflowId,
    ) -> impl Future<Output = Result<Vec<CheckpointRecord>, RepositoryError>> + Send {
        let records = self
            .tables
            .lock()
            .unwrap()
            .history
            .get(id)
            .map(|states| {
                states
                    .iter()
                    .map(|s| CheckpointRecord {
                        workflow_id: s.workflow_id,
                        version: s.version,
                        status: s.status,
                        iteration_count: s.iteration_count,
                        recorded_at: s.updated_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        async move { Ok(records) }
    }

    fn load_version(
        &self,
        id: &WorkflowId,
        version: u64,
    ) -> impl Future<Output = Result<Option<WorkflowState>, RepositoryError>> + Send {
        let state = self.tables.lock().unwrap().history.get(id).and_then(|states| {
            states.iter().find(|s| s.version == version).cloned()
        });
        async move { Ok(state) }
    }
}

// ---------------------------------------------------------------------------
// ScriptedNodes
// ---------------------------------------------------------------------------

/// Node executor with canned behaviour. Validation outcomes are popped from
/// a queue (empty queue means pass); each Generate call writes a distinct
/// file body.
#[derive(Default)]
pub struct ScriptedNodes {
    validations: Mutex<VecDeque<bool>>,
    generate_calls: AtomicUsize,
    feedback_seen: Mutex<Vec<Option<String>>>,
    gate: Option<Arc<Notify>>,
    started: Arc<Notify>,
}

impl ScriptedNodes {
    pub fn with_validations(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self {
            validations: Mutex::new(outcomes.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Make Generate block until the workflow is cancelled.
    pub fn gate_generation(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    /// Resolves once a gated Generate call has started.
    pub async fn generation_started(&self) {
        self.started.notified().await;
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn feedback_seen(&self) -> Vec<Option<String>> {
        self.feedback_seen.lock().unwrap().clone()
    }

    fn proposal(&self, state: &WorkflowState) -> Proposal {
        let call = self.generate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.feedback_seen
            .lock()
            .unwrap()
            .push(state.human_feedback.clone());
        let files: BTreeMap<String, String> = state
            .files
            .keys()
            .map(|path| (path.clone(), format!("# attempt {}\n", state.iteration_count + 1)))
            .collect();
        Proposal {
            files,
            summary: format!("attempt {call}"),
            diff: String::new(),
            partial: false,
        }
    }
}

impl NodeExecutor for ScriptedNodes {
    fn execute(
        &self,
        node: NodeKind,
        state: &WorkflowState,
    ) -> impl Future<Output = NodeResult> + Send {
        let gate = match node {
            NodeKind::Generate => self.gate.clone(),
            _ => None,
        };
        let payload = match node {
            NodeKind::Analyze => NodePayload::Analysis(AnalysisSummary {
                summary: "one function".to_string(),
                degraded: false,
            }),
            NodeKind::Generate => NodePayload::Generation(self.proposal(state)),
            NodeKind::Validate => {
                let passed = self.validations.lock().unwrap().pop_front().unwrap_or(true);
                let result = if passed {
                    ValidationResult::pass("lint", "ok")
                } else {
                    ValidationResult::fail("lint", "E501 line too long")
                };
                NodePayload::Validation(vec![result])
            }
            NodeKind::Reflect => NodePayload::Critique(Critique {
                iteration: state.iteration_count,
                error_summary: "line too long".to_string(),
                suggested_fix: "wrap it".to_string(),
                notes: Vec::new(),
                degraded: false,
            }),
            NodeKind::Commit => NodePayload::Commit(CommitReceipt {
                location: "memory".to_string(),
                files_written: state.files.len(),
                committed_at: Utc::now(),
            }),
        };
        let started = self.started.clone();
        async move {
            if let Some(gate) = gate {
                started.notify_one();
                gate.notified().await;
            }
            NodeResult::Success(payload)
        }
    }
}

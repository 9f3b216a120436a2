//! Workflow coordinator: the process-facing entry point.
//!
//! Creates workflows, drives them node by node until they terminate or park
//! at AWAITING_REVIEW, resumes parked workflows, and answers status queries.
//! Each loop iteration runs exactly one node, feeds its result through the
//! transition engine and persists the outcome before looking at it.
//!
//! A workflow is driven by at most one task at a time within a process. The
//! active set doubles as the cancellation registry: a cancel request for a
//! workflow being driven trips its token, and the driving task applies the
//! CANCELLED transition before running another node.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use reforge_types::config::EngineConfig;
use reforge_types::workflow::{
    CheckpointRecord, ReviewDecision, WorkflowId, WorkflowState, WorkflowStatus, WorkflowSummary,
    WorkflowView,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::engine::{StepInput, TransitionEngine, TransitionError};
use super::interrupt::InterruptController;
use super::node::NodeExecutor;
use crate::repository::checkpoint::CheckpointStore;

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Parameters for a new workflow.
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub goal: String,
    pub files: BTreeMap<String, String>,
    /// Falls back to the configured default when absent.
    pub max_iterations: Option<u32>,
}

/// Bounds applied to `max_iterations` at creation.
#[derive(Debug, Clone, Copy)]
pub struct IterationLimits {
    pub default: u32,
    pub max: u32,
}

impl From<&EngineConfig> for IterationLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default: config.default_max_iterations,
            max: config.max_iterations_limit,
        }
    }
}

impl Default for IterationLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The workflow was idle and is now CANCELLED.
    Cancelled(WorkflowState),
    /// The workflow is being driven; it stops before its next node.
    Requested,
}

#[derive(Debug, Default, Serialize)]
pub struct RecoveryReport {
    pub resumed: Vec<WorkflowSummary>,
    pub skipped: Vec<WorkflowId>,
    pub failed: Vec<(WorkflowId, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("workflow {0} is already being driven")]
    AlreadyRunning(WorkflowId),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<CheckpointError> for WorkflowError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::NotFound(id) => WorkflowError::NotFound(id),
            CheckpointError::Repository(msg) => WorkflowError::Persistence(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowCoordinator
// ---------------------------------------------------------------------------

pub struct WorkflowCoordinator<S: CheckpointStore, X: NodeExecutor> {
    checkpoints: Arc<CheckpointManager<S>>,
    interrupts: InterruptController<S>,
    engine: TransitionEngine,
    nodes: X,
    limits: IterationLimits,
    active: DashMap<WorkflowId, CancellationToken>,
}

impl<S: CheckpointStore, X: NodeExecutor> WorkflowCoordinator<S, X> {
    pub fn new(store: S, nodes: X, engine: TransitionEngine, limits: IterationLimits) -> Self {
        let checkpoints = Arc::new(CheckpointManager::new(store));
        Self {
            interrupts: InterruptController::new(checkpoints.clone(), engine),
            checkpoints,
            engine,
            nodes,
            limits,
            active: DashMap::new(),
        }
    }

    pub fn nodes(&self) -> &X {
        &self.nodes
    }

    /// Whether a task in this process is currently driving `id`.
    pub fn is_active(&self, id: &WorkflowId) -> bool {
        self.active.contains_key(id)
    }

    // -----------------------------------------------------------------------
    // Control surface
    // -----------------------------------------------------------------------

    /// Validate and persist a new workflow, leaving it in ANALYZING ready to
    /// be driven.
    pub async fn create(&self, request: NewWorkflow) -> Result<WorkflowState, WorkflowError> {
        let goal = request.goal.trim();
        if goal.is_empty() {
            return Err(WorkflowError::InvalidInput("goal must not be empty".to_string()));
        }
        if request.files.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "at least one file is required".to_string(),
            ));
        }
        let max_iterations = request.max_iterations.unwrap_or(self.limits.default);
        if max_iterations < 1 || max_iterations > self.limits.max {
            return Err(WorkflowError::InvalidInput(format!(
                "max_iterations must be between 1 and {}, got {max_iterations}",
                self.limits.max
            )));
        }

        let state = WorkflowState::new(goal, request.files, max_iterations, chrono::Utc::now());
        self.checkpoints.persist(&state).await?;
        tracing::info!(
            workflow_id = %state.workflow_id,
            files = state.files.len(),
            max_iterations,
            "workflow created"
        );

        self.advance(&state, StepInput::Created).await
    }

    /// Create a workflow and drive it until it parks or terminates.
    pub async fn start(&self, request: NewWorkflow) -> Result<WorkflowState, WorkflowError> {
        let state = self.create(request).await?;
        self.drive(state.workflow_id).await
    }

    /// Drive a workflow from its latest checkpoint.
    pub async fn drive(&self, id: WorkflowId) -> Result<WorkflowState, WorkflowError> {
        let token = self.claim(id)?;
        let result = match self.checkpoints.load(&id).await {
            Ok(state) => self.run_loop(state, &token).await,
            Err(e) => Err(e.into()),
        };
        self.release(id, result).await
    }

    /// Apply a reviewer decision to a parked workflow and keep driving.
    pub async fn resume(
        &self,
        id: WorkflowId,
        decision: ReviewDecision,
    ) -> Result<WorkflowState, WorkflowError> {
        let token = self.claim(id)?;
        let result = match self.interrupts.resume(id, decision).await {
            Ok(state) => self.run_loop(state, &token).await,
            Err(e) => Err(e),
        };
        self.release(id, result).await
    }

    /// Apply a reviewer decision without driving further. The caller is
    /// expected to `drive` the workflow afterwards.
    pub async fn review(
        &self,
        id: WorkflowId,
        decision: ReviewDecision,
    ) -> Result<WorkflowState, WorkflowError> {
        let _token = self.claim(id)?;
        let result = self.interrupts.resume(id, decision).await;
        self.release(id, result).await
    }

    /// Queue feedback on a parked workflow; consumed by the next Generate
    /// call if the reviewer rejects.
    pub async fn submit_feedback(
        &self,
        id: WorkflowId,
        feedback: String,
    ) -> Result<WorkflowState, WorkflowError> {
        let _token = self.claim(id)?;
        let result = self.interrupts.submit_feedback(id, feedback).await;
        self.release(id, result).await
    }

    /// Cancel a workflow in any non-terminal status.
    pub async fn cancel(&self, id: WorkflowId) -> Result<CancelOutcome, WorkflowError> {
        match self.active.entry(id) {
            Entry::Occupied(entry) => {
                entry.get().cancel();
                tracing::info!(workflow_id = %id, "cancellation requested for running workflow");
                return Ok(CancelOutcome::Requested);
            }
            Entry::Vacant(entry) => {
                entry.insert(CancellationToken::new());
            }
        }

        let result = match self.checkpoints.load(&id).await {
            Ok(state) => self.advance(&state, StepInput::Cancel).await,
            Err(e) => Err(e.into()),
        };
        self.active.remove(&id);
        result.map(CancelOutcome::Cancelled)
    }

    pub async fn state(&self, id: WorkflowId) -> Result<WorkflowState, WorkflowError> {
        Ok(self.checkpoints.load(&id).await?)
    }

    pub async fn status(&self, id: WorkflowId) -> Result<WorkflowView, WorkflowError> {
        Ok(self.checkpoints.load(&id).await?.view())
    }

    pub async fn list(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<WorkflowSummary>, WorkflowError> {
        Ok(self.checkpoints.list(status).await?)
    }

    pub async fn history(&self, id: WorkflowId) -> Result<Vec<CheckpointRecord>, WorkflowError> {
        Ok(self.checkpoints.history(&id).await?)
    }

    pub async fn checkpoint(
        &self,
        id: WorkflowId,
        version: u64,
    ) -> Result<WorkflowState, WorkflowError> {
        Ok(self.checkpoints.load_version(&id, version).await?)
    }

    /// Re-drive every workflow whose last checkpoint is mid-cycle, e.g.
    /// after a crash. Parked and terminal workflows are left alone.
    pub async fn recover(&self) -> Result<RecoveryReport, WorkflowError> {
        let mut report = RecoveryReport::default();

        for summary in self.checkpoints.list(None).await? {
            if summary.status.is_parked() {
                continue;
            }
            let id = summary.workflow_id;
            tracing::info!(workflow_id = %id, status = %summary.status, "recovering workflow");
            match self.drive(id).await {
                Ok(state) => report.resumed.push(state.summarize()),
                Err(WorkflowError::AlreadyRunning(_)) => report.skipped.push(id),
                Err(e) => {
                    tracing::error!(workflow_id = %id, error = %e, "workflow recovery failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Drive loop
    // -----------------------------------------------------------------------

    async fn run_loop(
        &self,
        mut state: WorkflowState,
        token: &CancellationToken,
    ) -> Result<WorkflowState, WorkflowError> {
        loop {
            if state.status == WorkflowStatus::Pending {
                state = self.advance(&state, StepInput::Created).await?;
                continue;
            }
            if state.status.is_terminal() {
                return Ok(state);
            }
            if state.status == WorkflowStatus::AwaitingReview {
                self.interrupts.park(&state);
                return Ok(state);
            }
            if token.is_cancelled() {
                return self.advance(&state, StepInput::Cancel).await;
            }
            let Some(node) = state.status.node() else {
                return Ok(state);
            };

            tracing::debug!(workflow_id = %state.workflow_id, node = %node, "executing node");
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = self.nodes.execute(node, &state) => Some(result),
            };
            let input = match result {
                Some(result) => StepInput::Node(result),
                None => {
                    tracing::info!(
                        workflow_id = %state.workflow_id,
                        node = %node,
                        "node abandoned on cancellation"
                    );
                    StepInput::Cancel
                }
            };
            state = self.advance(&state, input).await?;
        }
    }

    /// Apply one transition and persist it before anyone can observe it.
    async fn advance(
        &self,
        state: &WorkflowState,
        input: StepInput,
    ) -> Result<WorkflowState, WorkflowError> {
        let next = self.engine.step(state, input)?;
        self.checkpoints.persist(&next).await?;

        tracing::info!(
            workflow_id = %next.workflow_id,
            from = %state.status,
            to = %next.status,
            iteration = next.iteration_count,
            "workflow transition"
        );
        if let Some(message) = &next.error_message {
            if next.status == WorkflowStatus::Error {
                tracing::warn!(workflow_id = %next.workflow_id, error = %message, "workflow errored");
            }
        }
        Ok(next)
    }

    fn claim(&self, id: WorkflowId) -> Result<CancellationToken, WorkflowError> {
        match self.active.entry(id) {
            Entry::Occupied(_) => Err(WorkflowError::AlreadyRunning(id)),
            Entry::Vacant(entry) => {
                let token = CancellationToken::new();
                entry.insert(token.clone());
                Ok(token)
            }
        }
    }

    /// Leave the active set. A cancel that arrived after the loop's last
    /// check is still honoured here, before the claim is dropped.
    async fn release(
        &self,
        id: WorkflowId,
        result: Result<WorkflowState, WorkflowError>,
    ) -> Result<WorkflowState, WorkflowError> {
        let state = match result {
            Ok(state) => state,
            Err(e) => {
                self.active.remove(&id);
                return Err(e);
            }
        };

        if self
            .active
            .remove_if(&id, |_, token| !token.is_cancelled())
            .is_some()
        {
            return Ok(state);
        }

        let outcome = if state.status.is_terminal() {
            Ok(state)
        } else {
            self.advance(&state, StepInput::Cancel).await
        };
        self.active.remove(&id);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use reforge_types::workflow::WorkflowStatus::*;

    use crate::workflow::testing::{MemoryStore, ScriptedNodes};

    type Coordinator = WorkflowCoordinator<MemoryStore, ScriptedNodes>;

    fn coordinator(store: MemoryStore, nodes: ScriptedNodes) -> Coordinator {
        WorkflowCoordinator::new(
            store,
            nodes,
            TransitionEngine::default(),
            IterationLimits::default(),
        )
    }

    fn request(max_iterations: u32) -> NewWorkflow {
        NewWorkflow {
            goal: "add type hints".to_string(),
            files: BTreeMap::from([("a.py".to_string(), "def f(x): return x".to_string())]),
            max_iterations: Some(max_iterations),
        }
    }

    fn statuses(history: &[CheckpointRecord]) -> Vec<WorkflowStatus> {
        history.iter().map(|r| r.status).collect()
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_input() {
        let c = coordinator(MemoryStore::default(), ScriptedNodes::default());

        let mut bad = request(0);
        assert!(matches!(c.create(bad.clone()).await, Err(WorkflowError::InvalidInput(_))));

        bad.max_iterations = Some(11);
        assert!(matches!(c.create(bad.clone()).await, Err(WorkflowError::InvalidInput(_))));

        bad.max_iterations = Some(2);
        bad.files.clear();
        assert!(matches!(c.create(bad.clone()).await, Err(WorkflowError::InvalidInput(_))));

        let mut blank = request(2);
        blank.goal = "  ".to_string();
        assert!(matches!(c.create(blank).await, Err(WorkflowError::InvalidInput(_))));

        assert!(c.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_persists_pending_then_analyzing() {
        let c = coordinator(MemoryStore::default(), ScriptedNodes::default());
        let mut req = request(2);
        req.max_iterations = None;
        let state = c.create(req).await.unwrap();

        assert_eq!(state.status, Analyzing);
        assert_eq!(state.max_iterations, 3);
        let history = c.history(state.workflow_id).await.unwrap();
        assert_eq!(statuses(&history), vec![Pending, Analyzing]);
    }

    #[tokio::test]
    async fn test_retry_then_approve_completes() {
        let nodes = ScriptedNodes::with_validations([false, true]);
        let c = coordinator(MemoryStore::default(), nodes);

        let parked = c.start(request(2)).await.unwrap();
        assert_eq!(parked.status, AwaitingReview);
        assert_eq!(parked.iteration_count, 1);
        assert_eq!(parked.critique_history.len(), 1);

        let done = c
            .resume(parked.workflow_id, ReviewDecision::approve())
            .await
            .unwrap();
        assert_eq!(done.status, Completed);
        assert!(done.commit.is_some());

        let history = c.history(done.workflow_id).await.unwrap();
        assert_eq!(
            statuses(&history),
            vec![
                Pending,
                Analyzing,
                Generating,
                Validating,
                Reflecting,
                Generating,
                Validating,
                AwaitingReview,
                Committing,
                Completed,
            ]
        );
        let versions: Vec<u64> = history.iter().map(|r| r.version).collect();
        assert_eq!(versions, (0..10).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_failing_every_attempt_errors_at_budget() {
        let nodes = ScriptedNodes::with_validations([false, false]);
        let c = coordinator(MemoryStore::default(), nodes);

        let state = c.start(request(2)).await.unwrap();
        assert_eq!(state.status, Error);
        assert_eq!(state.iteration_count, 2);
        assert!(!state.error_message.unwrap_or_default().is_empty());
        assert_eq!(c.nodes().generate_calls(), 2);
    }

    #[tokio::test]
    async fn test_three_failures_never_reach_a_fourth_generate() {
        let nodes = ScriptedNodes::with_validations([false, false, false, true]);
        let c = coordinator(MemoryStore::default(), nodes);

        let state = c.start(request(3)).await.unwrap();
        assert_eq!(state.status, Error);
        assert_eq!(state.iteration_count, 3);
        assert_eq!(c.nodes().generate_calls(), 3);
        assert_eq!(state.critique_history.len(), 2);
    }

    #[tokio::test]
    async fn test_reject_with_feedback_regenerates_once() {
        let nodes = ScriptedNodes::with_validations([true, true]);
        let c = coordinator(MemoryStore::default(), nodes);

        let parked = c.start(request(2)).await.unwrap();
        assert_eq!(parked.iteration_count, 0);

        let again = c
            .resume(
                parked.workflow_id,
                ReviewDecision::reject_with("keep original naming"),
            )
            .await
            .unwrap();
        assert_eq!(again.status, AwaitingReview);
        assert_eq!(again.iteration_count, 1);
        assert!(again.human_feedback.is_none());

        let seen = c.nodes().feedback_seen();
        assert_eq!(seen, vec![None, Some("keep original naming".to_string())]);

        let history = c.history(again.workflow_id).await.unwrap();
        let after_resume = history
            .iter()
            .find(|r| r.version == parked.version + 1)
            .unwrap();
        assert_eq!(after_resume.status, Generating);
        assert_eq!(after_resume.iteration_count, 1);
    }

    #[tokio::test]
    async fn test_reject_without_feedback_is_terminal() {
        let c = coordinator(MemoryStore::default(), ScriptedNodes::default());
        let parked = c.start(request(2)).await.unwrap();
        let state = c
            .resume(parked.workflow_id, ReviewDecision::reject())
            .await
            .unwrap();
        assert_eq!(state.status, Rejected);
    }

    #[tokio::test]
    async fn test_queued_feedback_is_used_by_reject() {
        let nodes = ScriptedNodes::with_validations([true, true]);
        let c = coordinator(MemoryStore::default(), nodes);
        let parked = c.start(request(3)).await.unwrap();

        let queued = c
            .submit_feedback(parked.workflow_id, "use Optional".to_string())
            .await
            .unwrap();
        assert_eq!(queued.status, AwaitingReview);
        assert_eq!(queued.human_feedback.as_deref(), Some("use Optional"));

        let state = c
            .resume(parked.workflow_id, ReviewDecision::reject())
            .await
            .unwrap();
        assert_eq!(state.status, AwaitingReview);
        assert_eq!(
            c.nodes().feedback_seen().last().cloned().flatten().as_deref(),
            Some("use Optional")
        );
    }

    #[tokio::test]
    async fn test_resume_outside_review_leaves_state_untouched() {
        let store = MemoryStore::default();
        let c = coordinator(store.clone(), ScriptedNodes::with_validations([false, false]));
        let errored = c.start(request(2)).await.unwrap();
        assert_eq!(errored.status, Error);

        let before = serde_json::to_vec(&store.current(&errored.workflow_id).unwrap()).unwrap();
        let history_len = store.history_len(&errored.workflow_id);

        let err = c
            .resume(errored.workflow_id, ReviewDecision::approve())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition(TransitionError::InvalidTransition {
                status: Error,
                ..
            })
        ));

        let after = serde_json::to_vec(&store.current(&errored.workflow_id).unwrap()).unwrap();
        assert_eq!(before, after);
        assert_eq!(store.history_len(&errored.workflow_id), history_len);
        assert!(!c.is_active(&errored.workflow_id));
    }

    #[tokio::test]
    async fn test_duplicate_resume_is_refused() {
        let c = coordinator(MemoryStore::default(), ScriptedNodes::default());
        let parked = c.start(request(2)).await.unwrap();
        c.resume(parked.workflow_id, ReviewDecision::approve())
            .await
            .unwrap();
        let err = c
            .resume(parked.workflow_id, ReviewDecision::approve())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn test_review_applies_decision_without_driving() {
        let c = coordinator(MemoryStore::default(), ScriptedNodes::default());
        let parked = c.start(request(2)).await.unwrap();

        let reviewed = c
            .review(parked.workflow_id, ReviewDecision::approve())
            .await
            .unwrap();
        assert_eq!(reviewed.status, Committing);
        assert!(!c.is_active(&parked.workflow_id));

        let done = c.drive(parked.workflow_id).await.unwrap();
        assert_eq!(done.status, Completed);
    }

    #[tokio::test]
    async fn test_restart_after_suspension_matches_uninterrupted_run() {
        let uninterrupted = coordinator(MemoryStore::default(), ScriptedNodes::default());
        let parked = uninterrupted.start(request(2)).await.unwrap();
        let expected = uninterrupted
            .resume(parked.workflow_id, ReviewDecision::approve())
            .await
            .unwrap();

        let store = MemoryStore::default();
        let first = coordinator(store.clone(), ScriptedNodes::default());
        let parked = first.start(request(2)).await.unwrap();
        let id = parked.workflow_id;
        drop(first);

        let second = coordinator(store.clone(), ScriptedNodes::default());
        assert_eq!(second.status(id).await.unwrap().status, AwaitingReview);
        let resumed = second.resume(id, ReviewDecision::approve()).await.unwrap();

        assert_eq!(resumed.status, expected.status);
        assert_eq!(resumed.files, expected.files);
        assert_eq!(resumed.iteration_count, expected.iteration_count);
        assert_eq!(resumed.version, expected.version);
        assert_eq!(second.nodes().generate_calls(), 0);
    }

    #[tokio::test]
    async fn test_recover_redrives_mid_cycle_workflows() {
        let store = MemoryStore::default();
        let first = coordinator(store.clone(), ScriptedNodes::default());
        let created = first.create(request(2)).await.unwrap();
        let parked = first.start(request(2)).await.unwrap();
        drop(first);

        let second = coordinator(store, ScriptedNodes::default());
        let report = second.recover().await.unwrap();
        assert_eq!(report.resumed.len(), 1);
        assert_eq!(report.resumed[0].workflow_id, created.workflow_id);
        assert_eq!(report.resumed[0].status, AwaitingReview);
        assert!(report.failed.is_empty());
        assert_eq!(
            second.status(parked.workflow_id).await.unwrap().status,
            AwaitingReview
        );
    }

    #[tokio::test]
    async fn test_cancel_idle_and_terminal_workflows() {
        let c = coordinator(MemoryStore::default(), ScriptedNodes::default());
        let parked = c.start(request(2)).await.unwrap();

        match c.cancel(parked.workflow_id).await.unwrap() {
            CancelOutcome::Cancelled(state) => assert_eq!(state.status, Cancelled),
            other => panic!("expected cancelled, got {other:?}"),
        }
        assert!(matches!(
            c.cancel(parked.workflow_id).await,
            Err(WorkflowError::InvalidTransition(_))
        ));
        assert!(matches!(
            c.cancel(WorkflowId::new()).await,
            Err(WorkflowError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_while_driving_stops_before_next_node() {
        let nodes = ScriptedNodes::default().gate_generation();
        let c = Arc::new(coordinator(MemoryStore::default(), nodes));
        let created = c.create(request(2)).await.unwrap();
        let id = created.workflow_id;

        let driver = {
            let c = c.clone();
            tokio::spawn(async move { c.drive(id).await })
        };
        c.nodes().generation_started().await;

        assert!(matches!(c.drive(id).await, Err(WorkflowError::AlreadyRunning(_))));
        assert_eq!(c.cancel(id).await.unwrap(), CancelOutcome::Requested);

        let state = tokio::time::timeout(Duration::from_secs(5), driver)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(state.status, Cancelled);
        assert!(!c.is_active(&id));
        let history = c.history(id).await.unwrap();
        assert_eq!(
            statuses(&history),
            vec![Pending, Analyzing, Generating, Cancelled]
        );
    }

    #[tokio::test]
    async fn test_distinct_workflows_drive_concurrently() {
        let store = MemoryStore::default();
        let c = Arc::new(coordinator(store.clone(), ScriptedNodes::default()));
        let first = c.create(request(2)).await.unwrap().workflow_id;
        let second = c.create(request(3)).await.unwrap().workflow_id;

        let (a, b) = tokio::join!(c.drive(first), c.drive(second));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!((a.status, b.status), (AwaitingReview, AwaitingReview));
        assert_eq!((a.max_iterations, b.max_iterations), (2, 3));

        let (a, b) = tokio::join!(
            c.resume(first, ReviewDecision::approve()),
            c.resume(second, ReviewDecision::approve())
        );
        assert_eq!(a.unwrap().status, Completed);
        assert_eq!(b.unwrap().status, Completed);

        for id in [first, second] {
            assert!(!c.is_active(&id));
            let history = c.history(id).await.unwrap();
            assert!(history.iter().all(|r| r.workflow_id == id));
            assert_eq!(
                statuses(&history),
                vec![
                    Pending,
                    Analyzing,
                    Generating,
                    Validating,
                    AwaitingReview,
                    Committing,
                    Completed,
                ]
            );
            let versions: Vec<u64> = history.iter().map(|r| r.version).collect();
            assert_eq!(versions, (0..7).collect::<Vec<u64>>());
            assert_eq!(store.history_len(&id), 7);
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_stops_the_loop() {
        let store = MemoryStore::default();
        let c = coordinator(store.clone(), ScriptedNodes::default());
        let created = c.create(request(2)).await.unwrap();

        store.fail_writes(true);
        let err = c.drive(created.workflow_id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Persistence(_)));
        assert!(!c.is_active(&created.workflow_id));

        store.fail_writes(false);
        assert_eq!(c.status(created.workflow_id).await.unwrap().status, Analyzing);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let c = coordinator(MemoryStore::default(), ScriptedNodes::default());
        c.start(request(2)).await.unwrap();
        c.create(request(2)).await.unwrap();

        assert_eq!(c.list(None).await.unwrap().len(), 2);
        assert_eq!(c.list(Some(AwaitingReview)).await.unwrap().len(), 1);
        assert_eq!(c.list(Some(Analyzing)).await.unwrap().len(), 1);
        assert!(c.list(Some(Completed)).await.unwrap().is_empty());
    }
}

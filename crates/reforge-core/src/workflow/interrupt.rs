//! The human review suspension point.
//!
//! A workflow that reaches AWAITING_REVIEW is parked purely as persisted
//! state: no task waits on it. A later call re-loads the checkpoint, checks
//! that the workflow is still waiting, applies the reviewer's input through
//! the transition engine and persists the result. Anything arriving after the
//! workflow has moved on is refused with `InvalidTransition`, which is what
//! makes duplicate resume calls harmless.

use std::sync::Arc;

use reforge_types::workflow::{ReviewDecision, WorkflowId, WorkflowState, WorkflowStatus};

use super::checkpoint::CheckpointManager;
use super::coordinator::WorkflowError;
use super::engine::{StepInput, TransitionEngine, TransitionError};
use crate::repository::checkpoint::CheckpointStore;

pub struct InterruptController<S: CheckpointStore> {
    checkpoints: Arc<CheckpointManager<S>>,
    engine: TransitionEngine,
}

impl<S: CheckpointStore> InterruptController<S> {
    pub fn new(checkpoints: Arc<CheckpointManager<S>>, engine: TransitionEngine) -> Self {
        Self {
            checkpoints,
            engine,
        }
    }

    /// Record that `state` is parked. The checkpoint has already been
    /// written by the time this is called.
    pub fn park(&self, state: &WorkflowState) {
        debug_assert_eq!(state.status, WorkflowStatus::AwaitingReview);
        tracing::info!(
            workflow_id = %state.workflow_id,
            iteration = state.iteration_count,
            version = state.version,
            "workflow suspended awaiting review"
        );
    }

    /// Apply a reviewer decision to a parked workflow.
    pub async fn resume(
        &self,
        id: WorkflowId,
        decision: ReviewDecision,
    ) -> Result<WorkflowState, WorkflowError> {
        let state = self.load_parked(id, &StepInput::Review(decision.clone())).await?;
        let action = decision.action;
        let next = self.engine.step(&state, StepInput::Review(decision))?;
        self.checkpoints.persist(&next).await?;

        tracing::info!(
            workflow_id = %id,
            action = %action,
            status = %next.status,
            iteration = next.iteration_count,
            "review decision applied"
        );
        Ok(next)
    }

    /// Queue reviewer feedback on a parked workflow without deciding.
    pub async fn submit_feedback(
        &self,
        id: WorkflowId,
        feedback: String,
    ) -> Result<WorkflowState, WorkflowError> {
        let input = StepInput::Feedback(feedback);
        let state = self.load_parked(id, &input).await?;
        let next = self.engine.step(&state, input)?;
        self.checkpoints.persist(&next).await?;

        tracing::info!(workflow_id = %id, "review feedback queued");
        Ok(next)
    }

    async fn load_parked(
        &self,
        id: WorkflowId,
        input: &StepInput,
    ) -> Result<WorkflowState, WorkflowError> {
        let state = self.checkpoints.load(&id).await?;
        if state.status != WorkflowStatus::AwaitingReview {
            tracing::warn!(
                workflow_id = %id,
                status = %state.status,
                input = %input,
                "refusing review input for workflow that is not awaiting review"
            );
            return Err(TransitionError::InvalidTransition {
                status: state.status,
                input: input.label(),
            }
            .into());
        }
        Ok(state)
    }
}

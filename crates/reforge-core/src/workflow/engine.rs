//! Transition engine: the pure state machine behind every workflow.
//!
//! `TransitionEngine::step` takes the current persisted state plus one input
//! (a node result, a reviewer decision, queued feedback, or a cancel request)
//! and returns the next state. It performs no I/O and never mutates its
//! argument; the coordinator persists whatever it returns.
//!
//! | status          | input                         | next            |
//! |-----------------|-------------------------------|-----------------|
//! | PENDING         | created                       | ANALYZING       |
//! | ANALYZING       | analysis (or failure)         | GENERATING      |
//! | GENERATING      | proposal                      | VALIDATING      |
//! | GENERATING      | failure                       | ERROR           |
//! | VALIDATING      | all passed                    | AWAITING_REVIEW |
//! | VALIDATING      | any failed, budget left       | REFLECTING      |
//! | VALIDATING      | any failed, budget spent      | ERROR           |
//! | VALIDATING      | failure                       | ERROR           |
//! | REFLECTING      | critique (or failure)         | GENERATING      |
//! | AWAITING_REVIEW | feedback                      | AWAITING_REVIEW |
//! | AWAITING_REVIEW | approve                       | COMMITTING      |
//! | AWAITING_REVIEW | reject, no feedback           | REJECTED        |
//! | AWAITING_REVIEW | reject with feedback          | GENERATING      |
//! | COMMITTING      | receipt                       | COMPLETED       |
//! | COMMITTING      | failure                       | ERROR           |
//! | non-terminal    | cancel                        | CANCELLED       |

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use reforge_types::config::FeedbackPolicy;
use reforge_types::workflow::{
    AnalysisSummary, CommitReceipt, Critique, NodeKind, Proposal, ReviewAction, ReviewDecision,
    ValidationResult, WorkflowState, WorkflowStatus,
};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Data returned by a successful node execution.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    Analysis(AnalysisSummary),
    Generation(Proposal),
    Validation(Vec<ValidationResult>),
    Critique(Critique),
    Commit(CommitReceipt),
}

impl NodePayload {
    /// The node that produces this payload.
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Analysis(_) => NodeKind::Analyze,
            NodePayload::Generation(_) => NodeKind::Generate,
            NodePayload::Validation(_) => NodeKind::Validate,
            NodePayload::Critique(_) => NodeKind::Reflect,
            NodePayload::Commit(_) => NodeKind::Commit,
        }
    }
}

/// Structured outcome of one node execution.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    Success(NodePayload),
    Failure { reason: String, retryable: bool },
}

impl NodeResult {
    pub fn failure(reason: impl Into<String>, retryable: bool) -> Self {
        NodeResult::Failure {
            reason: reason.into(),
            retryable,
        }
    }
}

/// Everything that can move a workflow forward.
#[derive(Debug, Clone, PartialEq)]
pub enum StepInput {
    /// The workflow has just been persisted in PENDING.
    Created,
    /// The node for the current status finished.
    Node(NodeResult),
    /// A reviewer decided at the suspension point.
    Review(ReviewDecision),
    /// A reviewer queued feedback without deciding yet.
    Feedback(String),
    /// External cancel request.
    Cancel,
}

impl StepInput {
    pub fn label(&self) -> &'static str {
        match self {
            StepInput::Created => "creation",
            StepInput::Node(_) => "node result",
            StepInput::Review(ReviewDecision {
                action: ReviewAction::Approve,
                ..
            }) => "approve",
            StepInput::Review(_) => "reject",
            StepInput::Feedback(_) => "feedback",
            StepInput::Cancel => "cancel",
        }
    }
}

impl fmt::Display for StepInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A requested transition that the table does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot apply {input} while workflow is {status}")]
    InvalidTransition {
        status: WorkflowStatus,
        input: &'static str,
    },

    #[error("{node} result does not belong to status {status}")]
    UnexpectedResult {
        status: WorkflowStatus,
        node: NodeKind,
    },

    #[error("feedback text is empty")]
    EmptyFeedback,
}

// ---------------------------------------------------------------------------
// TransitionEngine
// ---------------------------------------------------------------------------

/// The single authority on which status follows which.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionEngine {
    feedback_policy: FeedbackPolicy,
}

impl TransitionEngine {
    pub fn new(feedback_policy: FeedbackPolicy) -> Self {
        Self { feedback_policy }
    }

    /// Apply `input` to `state`, stamping the result with the current time.
    pub fn step(
        &self,
        state: &WorkflowState,
        input: StepInput,
    ) -> Result<WorkflowState, TransitionError> {
        self.step_at(state, input, Utc::now())
    }

    /// Apply `input` to `state` as of `now`.
    pub fn step_at(
        &self,
        state: &WorkflowState,
        input: StepInput,
        now: DateTime<Utc>,
    ) -> Result<WorkflowState, TransitionError> {
        let mut next = state.clone();

        match (state.status, input) {
            (status, StepInput::Cancel) => {
                if status.is_terminal() {
                    return Err(invalid(status, &StepInput::Cancel));
                }
                next.status = WorkflowStatus::Cancelled;
            }

            (WorkflowStatus::Pending, StepInput::Created) => {
                next.status = WorkflowStatus::Analyzing;
            }

            (status, StepInput::Node(result)) => self.apply_node(&mut next, status, result)?,

            (WorkflowStatus::AwaitingReview, StepInput::Feedback(text)) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(TransitionError::EmptyFeedback);
                }
                next.human_feedback = Some(text.to_string());
            }

            (WorkflowStatus::AwaitingReview, StepInput::Review(decision)) => {
                self.apply_review(&mut next, decision)
            }

            (status, input) => return Err(invalid(status, &input)),
        }

        next.version += 1;
        next.updated_at = now;
        Ok(next)
    }

    fn apply_node(
        &self,
        next: &mut WorkflowState,
        status: WorkflowStatus,
        result: NodeResult,
    ) -> Result<(), TransitionError> {
        let Some(expected) = status.node() else {
            return Err(TransitionError::InvalidTransition {
                status,
                input: "node result",
            });
        };

        match result {
            NodeResult::Success(payload) => {
                if payload.kind() != expected {
                    return Err(TransitionError::UnexpectedResult {
                        status,
                        node: payload.kind(),
                    });
                }
                match payload {
                    NodePayload::Analysis(analysis) => {
                        next.analysis = Some(analysis);
                        next.status = WorkflowStatus::Generating;
                    }
                    NodePayload::Generation(proposal) => apply_proposal(next, proposal),
                    NodePayload::Validation(results) => apply_validation(next, results),
                    NodePayload::Critique(critique) => apply_critique(next, critique),
                    NodePayload::Commit(receipt) => {
                        next.commit = Some(receipt);
                        next.status = WorkflowStatus::Completed;
                    }
                }
            }
            NodeResult::Failure { reason, .. } => match expected {
                NodeKind::Analyze => {
                    next.analysis = Some(AnalysisSummary {
                        summary: String::new(),
                        degraded: true,
                    });
                    next.status = WorkflowStatus::Generating;
                }
                NodeKind::Generate => fail(next, format!("Generation failed: {reason}")),
                NodeKind::Validate => fail(next, format!("Validation unavailable: {reason}")),
                NodeKind::Reflect => {
                    let critique = fallback_critique(next.iteration_count, &next.validation_results);
                    apply_critique(next, critique);
                }
                NodeKind::Commit => fail(next, format!("Commit failed: {reason}")),
            },
        }
        Ok(())
    }

    fn apply_review(&self, next: &mut WorkflowState, decision: ReviewDecision) {
        let feedback = decision
            .feedback_text()
            .map(str::to_string)
            .or_else(|| next.human_feedback.take());

        match (decision.action, feedback) {
            (ReviewAction::Approve, _) => {
                next.human_feedback = None;
                next.status = WorkflowStatus::Committing;
            }
            (ReviewAction::Reject, None) => {
                next.status = WorkflowStatus::Rejected;
            }
            (ReviewAction::Reject, Some(feedback)) => match self.feedback_policy {
                FeedbackPolicy::Reject => {
                    next.human_feedback = Some(feedback);
                    next.status = WorkflowStatus::Rejected;
                }
                FeedbackPolicy::Regenerate => {
                    if next.iteration_count >= next.max_iterations {
                        next.human_feedback = Some(feedback);
                        let max = next.max_iterations;
                        fail(
                            next,
                            format!("Max iterations ({max}) reached; cannot retry with feedback"),
                        );
                    } else {
                        next.iteration_count += 1;
                        next.human_feedback = Some(feedback);
                        next.status = WorkflowStatus::Generating;
                    }
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Field updates
// ---------------------------------------------------------------------------

fn invalid(status: WorkflowStatus, input: &StepInput) -> TransitionError {
    TransitionError::InvalidTransition {
        status,
        input: input.label(),
    }
}

fn fail(next: &mut WorkflowState, message: String) {
    next.error_message = Some(message);
    next.status = WorkflowStatus::Error;
}

fn apply_proposal(next: &mut WorkflowState, proposal: Proposal) {
    next.attempt_hashes.push(fingerprint(&proposal.files));
    next.files = proposal.files;
    next.current_diff = proposal.diff;
    next.summary = proposal.summary;
    next.partial = proposal.partial;
    next.human_feedback = None;
    next.status = WorkflowStatus::Validating;
}

fn apply_validation(next: &mut WorkflowState, results: Vec<ValidationResult>) {
    let passed = !results.is_empty() && results.iter().all(|r| r.passed);
    next.validation_results = results;

    if passed {
        next.status = WorkflowStatus::AwaitingReview;
    } else if next.iteration_count + 1 >= next.max_iterations {
        let max = next.max_iterations;
        next.iteration_count = max;
        fail(
            next,
            format!("Max iterations ({max}) reached without passing validation"),
        );
    } else {
        next.status = WorkflowStatus::Reflecting;
    }
}

fn apply_critique(next: &mut WorkflowState, critique: Critique) {
    next.critique_history.push(critique);
    if next.iteration_count >= next.max_iterations {
        let max = next.max_iterations;
        fail(next, format!("Max iterations ({max}) reached during reflection"));
    } else {
        next.iteration_count += 1;
        next.status = WorkflowStatus::Generating;
    }
}

/// Critique derived directly from failing validation results.
pub fn fallback_critique(iteration: u32, results: &[ValidationResult]) -> Critique {
    let failures: Vec<_> = results.iter().filter(|r| !r.passed).collect();
    let error_summary = if failures.is_empty() {
        "Validation produced no passing results".to_string()
    } else {
        failures
            .iter()
            .map(|r| format!("{}: {}", r.tool_name, first_line(&r.detail)))
            .collect::<Vec<_>>()
            .join("; ")
    };

    Critique {
        iteration,
        error_summary,
        suggested_fix: "Fix the reported validation errors without changing behaviour."
            .to_string(),
        notes: Vec::new(),
        degraded: true,
    }
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("failed")
}

/// SHA-256 fingerprint of a file set, stable across map iteration order.
pub fn fingerprint(files: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (path, content) in files {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

//! Workflow domain types for Reforge.
//!
//! `WorkflowState` is the sole unit of persistence: every node result is
//! folded into it by the transition engine and the whole record is written to
//! the checkpoint store after each step. The view/summary types here are
//! read-only projections of it for presentation layers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a workflow. Assigned at creation, never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    /// Create a new WorkflowId using UUID v7 (time-sortable).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a WorkflowId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Pending,
    Analyzing,
    Generating,
    Validating,
    Reflecting,
    AwaitingReview,
    Committing,
    Completed,
    Rejected,
    Error,
    Cancelled,
}

impl WorkflowStatus {
    pub const ALL: [WorkflowStatus; 11] = [
        WorkflowStatus::Pending,
        WorkflowStatus::Analyzing,
        WorkflowStatus::Generating,
        WorkflowStatus::Validating,
        WorkflowStatus::Reflecting,
        WorkflowStatus::AwaitingReview,
        WorkflowStatus::Committing,
        WorkflowStatus::Completed,
        WorkflowStatus::Rejected,
        WorkflowStatus::Error,
        WorkflowStatus::Cancelled,
    ];

    /// Statuses with no outgoing transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed
                | WorkflowStatus::Rejected
                | WorkflowStatus::Error
                | WorkflowStatus::Cancelled
        )
    }

    /// Statuses a workflow may rest in between process lifetimes.
    pub fn is_parked(&self) -> bool {
        self.is_terminal() || *self == WorkflowStatus::AwaitingReview
    }

    /// The node that runs while the workflow is in this status, if any.
    pub fn node(&self) -> Option<NodeKind> {
        match self {
            WorkflowStatus::Analyzing => Some(NodeKind::Analyze),
            WorkflowStatus::Generating => Some(NodeKind::Generate),
            WorkflowStatus::Validating => Some(NodeKind::Validate),
            WorkflowStatus::Reflecting => Some(NodeKind::Reflect),
            WorkflowStatus::Committing => Some(NodeKind::Commit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "PENDING",
            WorkflowStatus::Analyzing => "ANALYZING",
            WorkflowStatus::Generating => "GENERATING",
            WorkflowStatus::Validating => "VALIDATING",
            WorkflowStatus::Reflecting => "REFLECTING",
            WorkflowStatus::AwaitingReview => "AWAITING_REVIEW",
            WorkflowStatus::Committing => "COMMITTING",
            WorkflowStatus::Completed => "COMPLETED",
            WorkflowStatus::Rejected => "REJECTED",
            WorkflowStatus::Error => "ERROR",
            WorkflowStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        WorkflowStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("invalid workflow status: '{s}'"))
    }
}

/// One named step of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Analyze,
    Generate,
    Validate,
    Reflect,
    Commit,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Analyze => write!(f, "analyze"),
            NodeKind::Generate => write!(f, "generate"),
            NodeKind::Validate => write!(f, "validate"),
            NodeKind::Reflect => write!(f, "reflect"),
            NodeKind::Commit => write!(f, "commit"),
        }
    }
}

// ---------------------------------------------------------------------------
// Node payloads stored on the state
// ---------------------------------------------------------------------------

/// Outcome of a single validation tool run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub tool_name: String,
    pub passed: bool,
    pub detail: String,
}

impl ValidationResult {
    pub fn pass(tool_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(tool_name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Structured feedback derived from a validation failure.
///
/// Appended to `critique_history` by the Reflect step and consumed by the
/// next Generate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    /// Iteration the critique was produced in.
    pub iteration: u32,
    /// What went wrong.
    pub error_summary: String,
    /// How the next attempt should differ.
    pub suggested_fix: String,
    /// Extra observations (e.g. a repeated attempt).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// True when produced without the reflection collaborator.
    #[serde(default)]
    pub degraded: bool,
}

impl Critique {
    /// Render the critique as guidance text for a generation prompt.
    pub fn as_guidance(&self) -> String {
        let mut text = format!(
            "Error summary: {}\nSuggested fix: {}",
            self.error_summary, self.suggested_fix
        );
        for note in &self.notes {
            text.push_str("\nNote: ");
            text.push_str(note);
        }
        text
    }
}

/// Result of the Analyze step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub summary: String,
    /// True when the analysis collaborator was unavailable.
    #[serde(default)]
    pub degraded: bool,
}

/// A proposed change set produced by the Generate step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Complete replacement file set.
    pub files: BTreeMap<String, String>,
    /// Human-readable summary of the change.
    pub summary: String,
    /// Unified diff against the original files.
    pub diff: String,
    /// True when the collaborator output was only partially understood.
    #[serde(default)]
    pub partial: bool,
}

/// Receipt returned by the change sink after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    /// Where the change landed (directory, branch, PR URL...).
    pub location: String,
    pub files_written: usize,
    pub committed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Human review
// ---------------------------------------------------------------------------

/// Reviewer action at the suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewAction::Approve => write!(f, "APPROVE"),
            ReviewAction::Reject => write!(f, "REJECT"),
        }
    }
}

impl FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Ok(ReviewAction::Approve),
            "reject" => Ok(ReviewAction::Reject),
            other => Err(format!("invalid review action: '{other}'")),
        }
    }
}

/// A reviewer decision, optionally carrying feedback text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub action: ReviewAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl ReviewDecision {
    pub fn approve() -> Self {
        Self {
            action: ReviewAction::Approve,
            feedback: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            action: ReviewAction::Reject,
            feedback: None,
        }
    }

    pub fn reject_with(feedback: impl Into<String>) -> Self {
        Self {
            action: ReviewAction::Reject,
            feedback: Some(feedback.into()),
        }
    }

    /// Feedback text with blank input treated as absent.
    pub fn feedback_text(&self) -> Option<&str> {
        self.feedback
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Workflow State
// ---------------------------------------------------------------------------

/// The complete, persisted state of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    /// Desired change, immutable after creation.
    pub goal: String,
    /// Files as submitted at creation; the diff base.
    pub original_files: BTreeMap<String, String>,
    /// Current file set, replaced wholesale by each Generate step.
    pub files: BTreeMap<String, String>,
    /// Retries charged against the budget; starts at 0.
    pub iteration_count: u32,
    /// Ceiling on `iteration_count`, set at creation.
    pub max_iterations: u32,
    /// Latest proposed change rendering.
    #[serde(default)]
    pub current_diff: String,
    /// Summary accompanying the latest proposal.
    #[serde(default)]
    pub summary: String,
    /// Whether the latest proposal came from best-effort extraction.
    #[serde(default)]
    pub partial: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisSummary>,
    /// Results of the latest Validate step.
    #[serde(default)]
    pub validation_results: Vec<ValidationResult>,
    /// Append-only record of prior failure analyses.
    #[serde(default)]
    pub critique_history: Vec<Critique>,
    /// Set only on the transition into ERROR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Reviewer feedback waiting to be consumed by the next Generate call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_feedback: Option<String>,
    /// SHA-256 fingerprints of each generated file set, in attempt order.
    #[serde(default)]
    pub attempt_hashes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<CommitReceipt>,
    /// Bumped on every applied transition.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Build a fresh PENDING workflow.
    pub fn new(
        goal: impl Into<String>,
        files: BTreeMap<String, String>,
        max_iterations: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id: WorkflowId::new(),
            status: WorkflowStatus::Pending,
            goal: goal.into(),
            original_files: files.clone(),
            files,
            iteration_count: 0,
            max_iterations,
            current_diff: String::new(),
            summary: String::new(),
            partial: false,
            analysis: None,
            validation_results: Vec::new(),
            critique_history: Vec::new(),
            error_message: None,
            human_feedback: None,
            attempt_hashes: Vec::new(),
            commit: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn latest_critique(&self) -> Option<&Critique> {
        self.critique_history.last()
    }

    /// Paths whose content differs from the submitted version.
    pub fn changed_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|(path, content)| self.original_files.get(*path) != Some(*content))
            .map(|(path, _)| path.as_str())
            .collect()
    }

    /// The file a presentation layer should focus on: the first changed
    /// file, else the first file.
    pub fn current_file(&self) -> Option<&str> {
        self.changed_files()
            .first()
            .copied()
            .or_else(|| self.files.keys().next().map(String::as_str))
    }

    pub fn view(&self) -> WorkflowView {
        WorkflowView {
            workflow_id: self.workflow_id,
            status: self.status,
            refactoring_goal: self.goal.clone(),
            iteration_count: self.iteration_count,
            max_iterations: self.max_iterations,
            current_file: self.current_file().map(str::to_string),
            current_diff: self.current_diff.clone(),
            refactoring_summary: self.summary.clone(),
            validation_results: self.validation_results.clone(),
            error_message: self.error_message.clone(),
            partial: self.partial,
            files_total: self.files.len(),
            files_changed: self.changed_files().len(),
            critique_count: self.critique_history.len(),
            pending_feedback: self.human_feedback.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summarize(&self) -> WorkflowSummary {
        WorkflowSummary {
            workflow_id: self.workflow_id,
            status: self.status,
            goal: self.goal.clone(),
            iteration_count: self.iteration_count,
            max_iterations: self.max_iterations,
            files_total: self.files.len(),
            error_message: self.error_message.clone(),
            updated_at: self.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Projections
// ---------------------------------------------------------------------------

/// Read-only status projection of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowView {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub refactoring_goal: String,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub current_file: Option<String>,
    pub current_diff: String,
    pub refactoring_summary: String,
    pub validation_results: Vec<ValidationResult>,
    pub error_message: Option<String>,
    pub partial: bool,
    pub files_total: usize,
    pub files_changed: usize,
    pub critique_count: usize,
    pub pending_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Compact listing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: WorkflowId,
    pub status: WorkflowStatus,
    pub goal: String,
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub files_total: usize,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of a workflow's checkpoint history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub workflow_id: WorkflowId,
    pub version: u64,
    pub status: WorkflowStatus,
    pub iteration_count: u32,
    pub recorded_at: DateTime<Utc>,
}

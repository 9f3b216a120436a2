//! Node executors: the five steps of the cycle.
//!
//! Each node reads the current state, calls its external collaborator and
//! returns a `NodeResult`. Nodes never mutate state and never pick the next
//! status; that is the transition engine's job.

use std::collections::BTreeMap;
use std::future::Future;

use reforge_types::error::CollaboratorError;
use reforge_types::llm::{CompletionRequest, Message};
use reforge_types::workflow::{
    AnalysisSummary, CommitReceipt, Critique, NodeKind, Proposal, ValidationResult, WorkflowId,
    WorkflowState,
};

use super::diff::unified_diff;
use super::engine::{NodePayload, NodeResult, fallback_critique};
use super::extract::{Extraction, extract_critique, extract_generation, truncate_chars};
use super::prompt;
use super::retry::RetryPolicy;
use crate::llm::box_provider::BoxLlmProvider;

const MAX_ANALYSIS_CHARS: usize = 4_000;

// ---------------------------------------------------------------------------
// Collaborator ports
// ---------------------------------------------------------------------------

/// Static-analysis collaborator. "All passed" is the sole success predicate.
pub trait ValidationService: Send + Sync {
    fn validate(
        &self,
        files: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Vec<ValidationResult>, CollaboratorError>> + Send;
}

/// Destination for approved changes (filesystem, branch, pull request...).
pub trait ChangeSink: Send + Sync {
    fn apply(
        &self,
        workflow_id: &WorkflowId,
        files: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<CommitReceipt, CollaboratorError>> + Send;
}

/// Executes the node belonging to a workflow's current status.
pub trait NodeExecutor: Send + Sync {
    fn execute(
        &self,
        node: NodeKind,
        state: &WorkflowState,
    ) -> impl Future<Output = NodeResult> + Send;
}

// ---------------------------------------------------------------------------
// WorkflowNodes
// ---------------------------------------------------------------------------

/// Model settings shared by the LLM-backed nodes.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
}

/// The production node set: LLM-backed analyze/generate/reflect plus the
/// validation and commit collaborators.
pub struct WorkflowNodes<V: ValidationService, C: ChangeSink> {
    llm: BoxLlmProvider,
    validator: V,
    sink: C,
    settings: ModelSettings,
    retry: RetryPolicy,
}

impl<V: ValidationService, C: ChangeSink> WorkflowNodes<V, C> {
    pub fn new(
        llm: BoxLlmProvider,
        validator: V,
        sink: C,
        settings: ModelSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            validator,
            sink,
            settings,
            retry,
        }
    }

    async fn ask(
        &self,
        operation: &str,
        system: &str,
        user: String,
    ) -> Result<String, CollaboratorError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: vec![Message::user(user)],
            system: Some(system.to_string()),
            max_tokens: self.settings.max_tokens,
            temperature: Some(0.2),
        };
        let llm = &self.llm;
        let request = &request;
        let response = self
            .retry
            .run(operation, move || async move {
                llm.complete(request).await.map_err(CollaboratorError::from)
            })
            .await?;
        Ok(response.content)
    }

    async fn analyze(&self, state: &WorkflowState) -> NodeResult {
        let summary = match self
            .ask("analyze", prompt::ANALYZE_SYSTEM, prompt::analysis_prompt(state))
            .await
        {
            Ok(content) => AnalysisSummary {
                summary: truncate_chars(content.trim(), MAX_ANALYSIS_CHARS).to_string(),
                degraded: false,
            },
            Err(e) => {
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    error = %e,
                    "analysis unavailable, continuing without it"
                );
                AnalysisSummary {
                    summary: String::new(),
                    degraded: true,
                }
            }
        };
        NodeResult::Success(NodePayload::Analysis(summary))
    }

    async fn generate(&self, state: &WorkflowState) -> NodeResult {
        let content = match self
            .ask("generate", prompt::GENERATE_SYSTEM, prompt::generation_prompt(state))
            .await
        {
            Ok(content) => content,
            Err(CollaboratorError::NotConfigured) => {
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    "no generation service configured, proposing unchanged files"
                );
                return self.proposal(
                    state,
                    state.files.clone(),
                    "Generation service unavailable; files left unchanged.".to_string(),
                    true,
                );
            }
            Err(e) => {
                tracing::error!(workflow_id = %state.workflow_id, error = %e, "generation failed");
                return NodeResult::failure(e.to_string(), e.is_retryable());
            }
        };

        match extract_generation(&content, &state.files) {
            Extraction::FullMatch { summary, files } => self.proposal(state, files, summary, false),
            Extraction::PartialMatch {
                summary,
                files,
                missing,
            } => {
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    missing = ?missing,
                    "generation output only partially matched the expected format"
                );
                let summary = summary.unwrap_or_else(|| "No summary provided.".to_string());
                self.proposal(state, files, summary, true)
            }
            Extraction::NoMatch => {
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    "could not extract any changes from generation output"
                );
                self.proposal(
                    state,
                    state.files.clone(),
                    "Could not extract changes from the generation output.".to_string(),
                    true,
                )
            }
        }
    }

    fn proposal(
        &self,
        state: &WorkflowState,
        files: BTreeMap<String, String>,
        summary: String,
        partial: bool,
    ) -> NodeResult {
        let diff = unified_diff(&state.original_files, &files);
        NodeResult::Success(NodePayload::Generation(Proposal {
            files,
            summary,
            diff,
            partial,
        }))
    }

    async fn validate(&self, state: &WorkflowState) -> NodeResult {
        let validator = &self.validator;
        let files = &state.files;
        match self
            .retry
            .run("validate", move || async move { validator.validate(files).await })
            .await
        {
            Ok(results) => {
                let failed = results.iter().filter(|r| !r.passed).count();
                tracing::info!(
                    workflow_id = %state.workflow_id,
                    tools = results.len(),
                    failed,
                    "validation finished"
                );
                NodeResult::Success(NodePayload::Validation(results))
            }
            Err(e) => NodeResult::failure(e.to_string(), e.is_retryable()),
        }
    }

    async fn reflect(&self, state: &WorkflowState) -> NodeResult {
        let notes = oscillation_notes(state);
        let critique = match self
            .ask("reflect", prompt::REFLECT_SYSTEM, prompt::reflection_prompt(state, &notes))
            .await
        {
            Ok(content) => {
                let sections = extract_critique(&content);
                let fallback = fallback_critique(state.iteration_count, &state.validation_results);
                Critique {
                    iteration: state.iteration_count,
                    error_summary: sections.error_summary.unwrap_or_else(|| {
                        let head = truncate_chars(content.trim(), 200);
                        if head.is_empty() {
                            fallback.error_summary.clone()
                        } else {
                            head.to_string()
                        }
                    }),
                    suggested_fix: sections.suggested_fix.unwrap_or(fallback.suggested_fix),
                    notes,
                    degraded: false,
                }
            }
            Err(e) => {
                tracing::warn!(
                    workflow_id = %state.workflow_id,
                    error = %e,
                    "reflection unavailable, deriving critique from validation output"
                );
                let mut critique =
                    fallback_critique(state.iteration_count, &state.validation_results);
                critique.notes = notes;
                critique
            }
        };
        NodeResult::Success(NodePayload::Critique(critique))
    }

    async fn commit(&self, state: &WorkflowState) -> NodeResult {
        let sink = &self.sink;
        let id = &state.workflow_id;
        let files = &state.files;
        match self
            .retry
            .run("commit", move || async move { sink.apply(id, files).await })
            .await
        {
            Ok(receipt) => NodeResult::Success(NodePayload::Commit(receipt)),
            Err(e) => NodeResult::failure(e.to_string(), e.is_retryable()),
        }
    }
}

impl<V: ValidationService, C: ChangeSink> NodeExecutor for WorkflowNodes<V, C> {
    fn execute(
        &self,
        node: NodeKind,
        state: &WorkflowState,
    ) -> impl Future<Output = NodeResult> + Send {
        async move {
            match node {
                NodeKind::Analyze => self.analyze(state).await,
                NodeKind::Generate => self.generate(state).await,
                NodeKind::Validate => self.validate(state).await,
                NodeKind::Reflect => self.reflect(state).await,
                NodeKind::Commit => self.commit(state).await,
            }
        }
    }
}

/// Notes flagging that the latest attempt reproduced an earlier one.
pub fn oscillation_notes(state: &WorkflowState) -> Vec<String> {
    let Some((latest, earlier)) = state.attempt_hashes.split_last() else {
        return Vec::new();
    };
    earlier
        .iter()
        .position(|hash| hash == latest)
        .map(|idx| {
            vec![format!(
                "Attempt {} produced exactly the same files as attempt {}; take a different approach.",
                state.attempt_hashes.len(),
                idx + 1
            )]
        })
        .unwrap_or_default()
}

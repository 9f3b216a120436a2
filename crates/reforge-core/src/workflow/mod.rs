//! Workflow engine core: transitions, node execution, suspension and
//! durable checkpointing.
//!
//! - `engine` -- pure transition table applied to `WorkflowState`
//! - `node` -- the five node executors and the collaborator ports they call
//! - `extract` -- fault-tolerant parsing of collaborator output
//! - `diff` -- unified diff rendering for proposals
//! - `prompt` -- prompt construction for the LLM-backed nodes
//! - `retry` -- exponential backoff within a single node invocation
//! - `checkpoint` -- checkpoint manager wrapping the store
//! - `interrupt` -- the human review suspension point
//! - `coordinator` -- create/drive/resume/cancel entry point

pub mod checkpoint;
pub mod coordinator;
pub mod diff;
pub mod engine;
pub mod extract;
pub mod interrupt;
pub mod node;
pub mod prompt;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

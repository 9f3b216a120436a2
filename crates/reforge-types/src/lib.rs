//! Shared domain types for Reforge.
//!
//! This crate contains the core domain types used across the Reforge engine:
//! workflow state and its projections, collaborator payloads, LLM wire types,
//! engine configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod workflow;

//! Infrastructure layer for Reforge.
//!
//! Contains implementations of the port traits defined in `reforge-core`:
//! SQLite and in-memory checkpoint stores, the Anthropic LLM provider,
//! command-based validation tools, the filesystem change sink, and config
//! loading.

pub mod config;
pub mod filesystem;
pub mod llm;
pub mod memory;
pub mod sink;
pub mod sqlite;
pub mod store;
pub mod validation;

//! Workflow engine and port trait definitions for Reforge.
//!
//! This crate holds the transition engine, node executors, interrupt
//! controller and coordinator, plus the "ports" (checkpoint store, LLM
//! provider, validation service, change sink) that the infrastructure layer
//! implements. It depends only on `reforge-types` -- never on
//! `reforge-infra` or any database/IO crate.

pub mod llm;
pub mod repository;
pub mod workflow;

//! HTTP/REST API layer for Reforge.
//!
//! Axum-based REST API at `/api/v1/` with the envelope response format and
//! CORS support. Workflows are driven on background tasks; every request
//! returns as soon as the triggering transition has been checkpointed.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;

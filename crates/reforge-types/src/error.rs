use thiserror::Error;

/// Errors from repository operations (used by trait definitions in reforge-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors raised by external collaborators (generation service, validation
/// tools, change sinks).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator not configured")]
    NotConfigured,

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("collaborator timed out: {0}")]
    Timeout(String),

    #[error("collaborator rejected the request: {0}")]
    Rejected(String),

    #[error("malformed collaborator output: {0}")]
    Malformed(String),
}

impl CollaboratorError {
    /// Transient failures worth retrying within a single node invocation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Unavailable(_)
                | CollaboratorError::RateLimited { .. }
                | CollaboratorError::Timeout(_)
        )
    }

    /// Server-suggested delay before the next attempt, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            CollaboratorError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }
}

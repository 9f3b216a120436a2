//! Stand-in provider used when no API key is available.
//!
//! Every call fails with [`LlmError::NotConfigured`], which the node
//! executors treat as "run degraded" rather than as a transient failure.

use reforge_core::llm::provider::LlmProvider;
use reforge_types::llm::{CompletionRequest, CompletionResponse, LlmError};

pub struct UnconfiguredProvider {
    reason: String,
}

impl UnconfiguredProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl LlmProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        tracing::debug!(reason = %self.reason, "completion requested without a configured provider");
        Err(LlmError::NotConfigured)
    }
}

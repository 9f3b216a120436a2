//! Engine configuration types.
//!
//! Loaded from `~/.reforge/config.toml`. Every field has a default, so an
//! absent or partial file yields a usable configuration.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Reforge engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Retry budget used when a workflow is created without one.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,

    /// Upper bound accepted for a workflow's retry budget.
    #[serde(default = "default_max_iterations_limit")]
    pub max_iterations_limit: u32,

    /// Backoff applied to transient collaborator failures within one node.
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub commit: CommitConfig,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_max_iterations_limit() -> u32 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_iterations: default_max_iterations(),
            max_iterations_limit: default_max_iterations_limit(),
            retry: RetryConfig::default(),
            review: ReviewConfig::default(),
            llm: LlmConfig::default(),
            validation: ValidationConfig::default(),
            commit: CommitConfig::default(),
        }
    }
}

/// Exponential backoff parameters for collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first call.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

/// What a REJECT carrying feedback does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackPolicy {
    /// Treat it as a retry: back to GENERATING, charged against the budget.
    #[default]
    Regenerate,
    /// Treat it as a plain rejection; the feedback is only recorded.
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default)]
    pub reject_with_feedback: FeedbackPolicy,
}

/// Language model settings for the analyze, generate and reflect nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub tools: Vec<ValidationToolConfig>,
}

/// One external checker run against candidate files.
///
/// `args` may contain `{files}`, which expands to every candidate path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationToolConfig {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// Skip instead of failing when the program is not installed.
    #[serde(default)]
    pub optional: bool,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// Where approved changes are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Defaults to `{data_dir}/output` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
    /// Keep `.orig` copies of files that already exist.
    #[serde(default)]
    pub backup: bool,
}

//! AnthropicProvider -- concrete [`LlmProvider`] for the Anthropic Messages
//! API (`/v1/messages`).
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is only exposed
//! when building request headers.

use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use reforge_core::llm::provider::LlmProvider;
use reforge_types::llm::{CompletionRequest, CompletionResponse, LlmError, StopReason, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<AnthropicContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Anthropic Claude provider.
///
/// Deliberately not `Debug`: the client holds the API key.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    /// The Anthropic API version header value.
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: SecretString, model: String, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
        })
    }

    /// The default model for this provider.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Override the base URL (proxies, gateways, local test servers).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn to_anthropic_request(&self, request: &CompletionRequest) -> AnthropicRequest {
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };
        AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            messages: request
                .messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            system: request.system.clone(),
            temperature: request.temperature,
        }
    }
}

/// Map a non-success HTTP status to an [`LlmError`].
fn error_for_status(status: StatusCode, body: String, retry_after: Option<&str>) -> LlmError {
    match status.as_u16() {
        400 | 404 | 413 | 422 => LlmError::InvalidRequest(format!("HTTP {status}: {body}")),
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited {
            retry_after_ms: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000),
        },
        529 => LlmError::Overloaded(body),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

fn stop_reason(raw: Option<&str>) -> StopReason {
    match raw {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

fn into_completion(resp: AnthropicResponse) -> CompletionResponse {
    let content = resp
        .content
        .iter()
        .filter_map(|block| match block {
            AnthropicContentBlock::Text { text } => Some(text.as_str()),
            AnthropicContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("");

    CompletionResponse {
        id: resp.id,
        content,
        model: resp.model,
        stop_reason: stop_reason(resp.stop_reason.as_deref()),
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.to_anthropic_request(request);

        let response = self
            .client
            .post(self.url("/v1/messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(e.to_string())
                } else {
                    LlmError::Provider {
                        message: format!("HTTP request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let error_body = response.text().await.unwrap_or_default();
            tracing::debug!(status = %status, "anthropic request failed");
            return Err(error_for_status(status, error_body, retry_after.as_deref()));
        }

        let resp: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        let completion = into_completion(resp);
        tracing::debug!(
            model = %completion.model,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            stop_reason = %completion.stop_reason,
            "anthropic completion"
        );
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_types::llm::Message;

    fn make_provider() -> AnthropicProvider {
        AnthropicProvider::new(
            SecretString::from("test-key-not-real"),
            "claude-sonnet-4-5".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(make_provider().name(), "anthropic");
    }

    #[test]
    fn test_to_anthropic_request_falls_back_to_default_model() {
        let provider = make_provider();
        let request = CompletionRequest {
            model: String::new(),
            messages: vec![Message::user("Hello")],
            system: Some("Be brief".to_string()),
            max_tokens: 100,
            temperature: Some(0.2),
        };

        let body = serde_json::to_value(provider.to_anthropic_request(&request)).unwrap();
        assert_eq!(body["model"], "claude-sonnet-4-5");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn test_with_base_url_trims_trailing_slash() {
        let provider = make_provider().with_base_url("http://localhost:9999/".to_string());
        assert_eq!(provider.url("/v1/messages"), "http://localhost:9999/v1/messages");
    }

    #[test]
    fn test_error_for_status() {
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, String::new(), None),
            LlmError::AuthenticationFailed
        ));
        assert!(matches!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, String::new(), Some("3")),
            LlmError::RateLimited {
                retry_after_ms: Some(3000)
            }
        ));
        assert!(matches!(
            error_for_status(StatusCode::from_u16(529).unwrap(), "busy".into(), None),
            LlmError::Overloaded(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_REQUEST, "bad".into(), None),
            LlmError::InvalidRequest(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, String::new(), None),
            LlmError::Provider { .. }
        ));
    }

    #[test]
    fn test_response_text_blocks_are_joined() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{
                "id": "msg_1",
                "model": "claude-sonnet-4-5",
                "content": [
                    {"type": "text", "text": "[SUMMARY]\n"},
                    {"type": "thinking", "thinking": "..."},
                    {"type": "text", "text": "done"}
                ],
                "stop_reason": "max_tokens",
                "usage": {"input_tokens": 12, "output_tokens": 34}
            }"#,
        )
        .unwrap();

        let completion = into_completion(resp);
        assert_eq!(completion.content, "[SUMMARY]\ndone");
        assert_eq!(completion.stop_reason, StopReason::MaxTokens);
        assert_eq!(completion.usage.output_tokens, 34);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_provider_error() {
        let provider = make_provider().with_base_url("http://127.0.0.1:9".to_string());
        let request = CompletionRequest {
            model: String::new(),
            messages: vec![Message::user("Hello")],
            system: None,
            max_tokens: 10,
            temperature: None,
        };
        let err = provider.complete(&request).await.unwrap_err();
        assert!(matches!(
            err,
            LlmError::Provider { .. } | LlmError::Timeout(_)
        ));
    }
}

//! LLM provider implementations and the factory that picks one from
//! configuration.

pub mod anthropic;
pub mod unconfigured;

use std::time::Duration;

use secrecy::SecretString;

use reforge_core::llm::box_provider::BoxLlmProvider;
use reforge_types::config::LlmConfig;

use self::anthropic::AnthropicProvider;
use self::unconfigured::UnconfiguredProvider;

/// Build the provider described by `config`.
///
/// The API key is read from the environment variable named by
/// `config.api_key_env`. Without a key (or if the HTTP client cannot be
/// built) the returned provider is [`UnconfiguredProvider`], so the workflow
/// still runs with deterministic fallback payloads.
pub fn create_provider(config: &LlmConfig) -> BoxLlmProvider {
    let key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());
    provider_with_key(config, key)
}

fn provider_with_key(config: &LlmConfig, key: Option<String>) -> BoxLlmProvider {
    let Some(key) = key else {
        tracing::warn!(
            env = %config.api_key_env,
            "no LLM API key found; generation will run degraded"
        );
        return BoxLlmProvider::new(UnconfiguredProvider::new(format!(
            "{} is not set",
            config.api_key_env
        )));
    };

    let timeout = Duration::from_secs(config.request_timeout_secs);
    match AnthropicProvider::new(SecretString::from(key), config.model.clone(), timeout) {
        Ok(provider) => {
            let provider = match &config.base_url {
                Some(base_url) => provider.with_base_url(base_url.clone()),
                None => provider,
            };
            tracing::info!(model = %provider.model(), "using anthropic provider");
            BoxLlmProvider::new(provider)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to build LLM provider; generation will run degraded");
            BoxLlmProvider::new(UnconfiguredProvider::new(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_with_key_is_anthropic() {
        let provider = provider_with_key(&LlmConfig::default(), Some("sk-test".to_string()));
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn test_missing_key_is_unconfigured() {
        let provider = provider_with_key(&LlmConfig::default(), None);
        assert_eq!(provider.name(), "unconfigured");
    }

    #[test]
    fn test_create_provider_reads_named_env_var() {
        let config = LlmConfig {
            api_key_env: "REFORGE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(create_provider(&config).name(), "unconfigured");
    }
}

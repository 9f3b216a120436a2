//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.reforge/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::Path;

use reforge_types::config::EngineConfig;

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or unparsable file: warning, then the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    let config = match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            return EngineConfig::default();
        }
    };

    sanitize(config)
}

/// Clamp values that would make the engine unusable.
fn sanitize(mut config: EngineConfig) -> EngineConfig {
    if config.max_iterations_limit == 0 {
        tracing::warn!("max_iterations_limit must be at least 1, using 1");
        config.max_iterations_limit = 1;
    }
    if config.default_max_iterations == 0 || config.default_max_iterations > config.max_iterations_limit {
        let clamped = config.default_max_iterations.clamp(1, config.max_iterations_limit);
        tracing::warn!(
            default_max_iterations = config.default_max_iterations,
            max_iterations_limit = config.max_iterations_limit,
            "default_max_iterations out of range, using {clamped}"
        );
        config.default_max_iterations = clamped;
    }
    if config.retry.max_attempts == 0 {
        config.retry.max_attempts = 1;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use reforge_types::config::FeedbackPolicy;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.default_max_iterations, 3);
        assert_eq!(config.max_iterations_limit, 10);
        assert!(config.validation.tools.is_empty());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
default_max_iterations = 2

[review]
reject_with_feedback = "reject"

[[validation.tools]]
name = "ruff"
program = "ruff"
args = ["check", "{files}"]
optional = true
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.default_max_iterations, 2);
        assert_eq!(config.review.reject_with_feedback, FeedbackPolicy::Reject);
        assert_eq!(config.validation.tools.len(), 1);
        assert_eq!(config.validation.tools[0].args, vec!["check", "{files}"]);
        assert!(config.validation.tools[0].optional);
    }

    #[tokio::test]
    async fn load_engine_config_malformed_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "default_max_iterations = [")
            .await
            .unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.default_max_iterations, 3);
    }

    #[tokio::test]
    async fn load_engine_config_clamps_default_to_limit() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            "default_max_iterations = 20\nmax_iterations_limit = 5\n",
        )
        .await
        .unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.default_max_iterations, 5);
    }
}

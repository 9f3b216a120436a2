//! Application state wiring all services together.
//!
//! The coordinator is generic over its checkpoint store and node executor;
//! AppState pins it to the store backend and the production node set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reforge_core::workflow::coordinator::{IterationLimits, WorkflowCoordinator};
use reforge_core::workflow::engine::TransitionEngine;
use reforge_core::workflow::node::{ModelSettings, WorkflowNodes};
use reforge_core::workflow::retry::RetryPolicy;
use reforge_infra::config::load_engine_config;
use reforge_infra::filesystem::{default_output_dir, resolve_data_dir};
use reforge_infra::llm::create_provider;
use reforge_infra::sink::FileSystemSink;
use reforge_infra::memory::InMemoryCheckpointStore;
use reforge_infra::sqlite::checkpoint::SqliteCheckpointStore;
use reforge_infra::sqlite::pool::{DatabasePool, database_url};
use reforge_infra::store::CheckpointBackend;
use reforge_infra::validation::CommandValidator;
use reforge_types::config::EngineConfig;

/// Concrete type aliases for the generics pinned to infra implementations.
pub type ConcreteNodes = WorkflowNodes<CommandValidator, FileSystemSink>;

pub type ConcreteCoordinator = WorkflowCoordinator<CheckpointBackend, ConcreteNodes>;

/// Where checkpoints are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// `reforge.db` in the data directory.
    Durable,
    /// Process memory only.
    Ephemeral,
}

/// Shared application state, used by both CLI commands and REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ConcreteCoordinator>,
    pub config: Arc<EngineConfig>,
    pub data_dir: PathBuf,
    /// `None` when running ephemeral.
    pub db_pool: Option<DatabasePool>,
}

impl AppState {
    /// Resolve the data directory, load its config and wire services.
    pub async fn init(mode: StoreMode) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_engine_config(&data_dir).await;
        Self::with_config(&data_dir, config, mode).await
    }

    /// Wire services for `data_dir` using an already-loaded config.
    pub async fn with_config(
        data_dir: &Path,
        config: EngineConfig,
        mode: StoreMode,
    ) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let (store, db_pool) = match mode {
            StoreMode::Durable => {
                let pool = DatabasePool::new(&database_url(data_dir)).await?;
                let store = CheckpointBackend::Sqlite(SqliteCheckpointStore::new(pool.clone()));
                (store, Some(pool))
            }
            StoreMode::Ephemeral => {
                let store = CheckpointBackend::Memory(InMemoryCheckpointStore::new());
                (store, None)
            }
        };
        tracing::debug!(store = store.kind(), "checkpoint store selected");

        let output_dir = config
            .commit
            .output_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default_output_dir(data_dir));

        let validator = CommandValidator::new(config.validation.tools.clone());
        let sink = FileSystemSink::new(output_dir, config.commit.backup);
        tracing::debug!(
            tools = validator.tools().len(),
            output_dir = %sink.output_dir().display(),
            "collaborators configured"
        );

        let nodes = WorkflowNodes::new(
            create_provider(&config.llm),
            validator,
            sink,
            ModelSettings {
                model: config.llm.model.clone(),
                max_tokens: config.llm.max_tokens,
            },
            RetryPolicy::from_config(&config.retry),
        );

        let coordinator = WorkflowCoordinator::new(
            store,
            nodes,
            TransitionEngine::new(config.review.reject_with_feedback),
            IterationLimits::from(&config),
        );

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");
        Ok(Self {
            coordinator: Arc::new(coordinator),
            config: Arc::new(config),
            data_dir: data_dir.to_path_buf(),
            db_pool,
        })
    }

    /// Release the database connections, if any.
    pub async fn close(&self) {
        if let Some(pool) = &self.db_pool {
            pool.close().await;
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// State over a throwaway data dir with no LLM key, so every LLM-backed
    /// node runs degraded.
    pub async fn offline_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.llm.api_key_env = "REFORGE_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        config.retry.max_attempts = 1;
        let state = AppState::with_config(dir.path(), config, StoreMode::Durable)
            .await
            .unwrap();
        (state, dir)
    }
}

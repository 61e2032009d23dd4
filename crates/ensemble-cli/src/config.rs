use anyhow::Context;
use ensemble_agent::{ModelConfig, RetryPolicy};
use ensemble_memory::CacheConfig;
use ensemble_orchestrator::{ExplorationConfig, LearnerConfig, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Environment variable that overrides `model.api_key`.
pub const API_KEY_ENV: &str = "ENSEMBLE_API_KEY";

/// Everything `ensemble.toml` can hold. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub exploration: ExplorationConfig,
    #[serde(default)]
    pub learner: LearnerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl EnsembleConfig {
    /// Read `path`, or fall back to defaults when it does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text)
                .with_context(|| format!("Invalid config file '{}'", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file '{}'", path.display()))
            }
        };
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                config.model.api_key = key;
            }
        }
        Ok(config)
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

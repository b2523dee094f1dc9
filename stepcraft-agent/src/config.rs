//! Agent runtime configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stepcraft_vm::{EngineConfig, Error, ProviderConfig, ProviderType, Result};

/// Which model backend to talk to. Credentials always come from the
/// environment, never from the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Overrides the provider's default model
    pub model: Option<String>,
    /// Overrides the provider's base URL
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderSettings {
    /// Resolve against the environment; explicit settings win
    pub fn resolve(&self) -> ProviderConfig {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(&self, lookup: F) -> ProviderConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ProviderConfig::from_lookup(self.provider_type, lookup);
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = Some(base_url.clone());
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(secs);
        }
        config
    }
}

/// Everything needed to assemble an [`crate::Agent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Directory of `*.json` agent definitions, loaded on top of the built-ins
    pub agents_dir: Option<PathBuf>,
    /// Root the filesystem tools operate in
    pub workspace: PathBuf,
    pub engine: EngineConfig,
    pub provider: ProviderSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agents_dir: None,
            workspace: PathBuf::from("."),
            engine: EngineConfig::default(),
            provider: ProviderSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::from(e).with_context("path", path.display().to_string()))?;
        Self::from_json(&content)
            .map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| {
            Error::parse_failed(e.to_string())
                .with_operation("AgentConfig::from_json")
                .set_source(e)
        })?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn with_agents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.agents_dir = Some(dir.into());
        self
    }

    pub fn with_workspace(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace = dir.into();
        self
    }

    pub fn with_provider(mut self, provider_type: ProviderType) -> Self {
        self.provider.provider_type = provider_type;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.provider.model = Some(model.into());
        self
    }
}

//! Agent catalog: built-in agents plus JSON definitions from disk

use crate::builtin::builtin_agents;
use std::path::Path;
use std::sync::Arc;
use stepcraft_vm::{AgentDefinition, Error, Registry, Result};
use tracing::{debug, info};

/// Named agent definitions, looked up by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: Registry<AgentDefinition>,
}

impl AgentCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every built-in agent
    pub fn with_builtins() -> Result<Self> {
        let mut catalog = Self::new();
        for definition in builtin_agents() {
            catalog.register(definition)?;
        }
        Ok(catalog)
    }

    /// Add a definition; fails if the name is taken
    pub fn register(&mut self, definition: AgentDefinition) -> Result<()> {
        validate(&definition)?;
        self.agents.register(Arc::new(definition))
    }

    /// Add a definition, replacing any agent with the same name
    pub fn upsert(&mut self, definition: AgentDefinition) -> Result<Option<Arc<AgentDefinition>>> {
        validate(&definition)?;
        Ok(self.agents.replace(Arc::new(definition)))
    }

    /// Load every `*.json` file in `dir`, in file name order.
    ///
    /// A definition on disk replaces a built-in of the same name, but two
    /// files defining the same agent is an error.
    pub async fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| Error::from(e).with_context("dir", dir.display().to_string()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded: Vec<String> = Vec::new();
        for path in &paths {
            let definition = load_file(path).await?;
            if loaded.contains(&definition.name) {
                return Err(Error::already_exists(definition.name.clone())
                    .with_operation("AgentCatalog::load_dir")
                    .with_context("path", path.display().to_string()));
            }
            loaded.push(definition.name.clone());

            let name = definition.name.clone();
            if self.upsert(definition)?.is_some() {
                info!(agent = %name, path = %path.display(), "agent definition overrides existing agent");
            } else {
                debug!(agent = %name, path = %path.display(), "agent definition loaded");
            }
        }
        Ok(loaded.len())
    }

    /// Look up an agent by name
    pub fn get(&self, name: &str) -> Result<Arc<AgentDefinition>> {
        self.agents.get(name).ok_or_else(|| {
            Error::agent_not_found(name)
                .with_operation("AgentCatalog::get")
                .with_context("available", self.names().join(", "))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.names()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AgentDefinition>> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

async fn load_file(path: &Path) -> Result<AgentDefinition> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::from(e).with_context("path", path.display().to_string()))?;
    serde_json::from_str(&content).map_err(|e| {
        Error::parse_failed(format!("invalid agent definition: {}", e))
            .with_operation("AgentCatalog::load_dir")
            .with_context("path", path.display().to_string())
            .set_source(e)
    })
}

fn validate(definition: &AgentDefinition) -> Result<()> {
    if definition.name.trim().is_empty() {
        return Err(Error::config_invalid("agent name must not be empty")
            .with_operation("AgentCatalog::register"));
    }
    Ok(())
}

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// A named prompt selectable for one pipeline slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentPrompt {
    pub name: String,
    pub prompt: String,
}

/// Prompt configuration, loaded once at startup and read-only afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PromptCatalog {
    /// Prompts offered to the three analyzer slots.
    pub agents: Vec<AgentPrompt>,
    /// Prompts offered to the consensus slot.
    pub consensus: Vec<AgentPrompt>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read prompt file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed prompt file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Which list a prompt name is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Agent,
    Consensus,
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptKind::Agent => write!(f, "analyzer"),
            PromptKind::Consensus => write!(f, "consensus"),
        }
    }
}

impl PromptCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: PromptCatalog =
            serde_json::from_str(&raw).map_err(|source| CatalogError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            path = %path.display(),
            agents = catalog.agents.len(),
            consensus = catalog.consensus.len(),
            "Prompt catalog loaded"
        );
        Ok(catalog)
    }

    fn list(&self, kind: PromptKind) -> &[AgentPrompt] {
        match kind {
            PromptKind::Agent => &self.agents,
            PromptKind::Consensus => &self.consensus,
        }
    }

    /// True when either slot type has nothing to choose from.
    pub fn is_incomplete(&self) -> bool {
        self.agents.is_empty() || self.consensus.is_empty()
    }

    /// Exact name lookup.
    pub fn find(&self, kind: PromptKind, name: &str) -> Option<&AgentPrompt> {
        self.list(kind).iter().find(|p| p.name == name)
    }

    /// Resolve an optional selection; no selection means the first entry.
    pub fn select(&self, kind: PromptKind, name: Option<&str>) -> Option<&AgentPrompt> {
        match name {
            Some(name) => self.find(kind, name),
            None => self.list(kind).first(),
        }
    }

    /// Names containing `partial` (case-insensitive), in catalog order.
    pub fn names_matching(&self, kind: PromptKind, partial: &str) -> Vec<String> {
        let partial = partial.to_lowercase();
        self.list(kind)
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&partial))
            .map(|p| p.name.clone())
            .collect()
    }
}

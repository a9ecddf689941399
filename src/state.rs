use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::catalog::PromptCatalog;
use crate::llm::LlmClient;

/// Run parameters (admins can modify at runtime).
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Upper bound on each LLM call, streamed or not.
    pub call_timeout_secs: u64,
    pub parallel_analyzers: bool,
    /// Minimum gap between edits of a streaming message.
    pub edit_interval_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 180,
            parallel_analyzers: false,
            edit_interval_ms: 1200,
        }
    }
}

impl RunConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn edit_interval(&self) -> Duration {
        Duration::from_millis(self.edit_interval_ms)
    }
}

pub struct AppState {
    pub llm: Arc<LlmClient>,
    pub catalog: Arc<PromptCatalog>,
    /// Why the prompt file could not be loaded, shown alongside prompt lists.
    pub catalog_warning: Option<String>,
    pub admin_ids: HashSet<u64>,
    pub run_config: Arc<RwLock<RunConfig>>,
}

impl AppState {
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

pub type Context<'a> = poise::Context<'a, AppState, anyhow::Error>;

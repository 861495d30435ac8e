//! Layered configuration: defaults, then a TOML file, then the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::AgentConfig;
use crate::agent_loop::OrchestratorKind;
use crate::error::{ConductorError, Result};
use crate::provider::CompletionBackend;
use crate::stream::DEFAULT_CAPACITY;
use crate::tools::config::{parse_tool_configs, registry_from_config, ToolConfig};
use crate::tools::{builtin, with_delegate, ToolRegistry};

pub use crate::provider::DEFAULT_BASE_URL;
pub const DEFAULT_MODEL: &str = "qwen/qwen3-235b-a22b-2507";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Use the calculator for math and get_current_time for the current time.";

/// Settings for the CLI and HTTP front ends.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub orchestrator: OrchestratorKind,
    pub system_prompt: String,
    pub steering_instruction: Option<String>,
    pub event_buffer: usize,
    /// Replaces the built-in example tools when non-empty.
    pub tools: Vec<ToolConfig>,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            orchestrator: OrchestratorKind::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            steering_instruction: None,
            event_buffer: DEFAULT_CAPACITY,
            tools: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ConductorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConductorConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("orchestrator", &self.orchestrator)
            .field("event_buffer", &self.event_buffer)
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl ConductorConfig {
    /// Load from `path` (or the platform config file), then apply `.env` and
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Read a TOML file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            ConductorError::Configuration(format!("{}: {e}", path.display()))
        })
    }

    /// `<platform config dir>/conductor/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "conductor")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Apply `CONDUCTOR_*` overrides read through `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = lookup("CONDUCTOR_API_KEY").or_else(|| lookup("OPENROUTER_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = lookup("CONDUCTOR_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = lookup("CONDUCTOR_MODEL") {
            self.model = model;
        }
        if let Some(kind) = lookup("CONDUCTOR_ORCHESTRATOR") {
            self.orchestrator = OrchestratorKind::from_str(kind.trim().to_lowercase().as_str())
                .map_err(|_| {
                    ConductorError::Configuration(format!("unknown orchestrator \"{kind}\""))
                })?;
        }
        if let Some(prompt) = lookup("CONDUCTOR_SYSTEM_PROMPT") {
            self.system_prompt = prompt;
        }
        if let Some(json) = lookup("CONDUCTOR_TOOLS_JSON") {
            self.tools = parse_tool_configs(&json).map_err(|e| {
                ConductorError::Configuration(format!("invalid CONDUCTOR_TOOLS_JSON: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    #[cfg(feature = "openai-compatible")]
    pub fn backend(&self) -> Arc<dyn CompletionBackend> {
        Arc::new(crate::provider::OpenAiCompatibleBackend::new(
            self.model.clone(),
            self.api_key.clone(),
            Some(self.base_url.clone()),
        ))
    }

    /// Tools built from `self.tools`, or the calculator and clock when none
    /// are configured.
    pub fn tool_pool(&self) -> Result<ToolRegistry> {
        if self.tools.is_empty() {
            return Ok(ToolRegistry::new()
                .with_tool(builtin::calculator_tool())
                .with_tool(builtin::current_time_tool()));
        }
        registry_from_config(&self.tools)
    }

    /// Session settings over `pool`. With `delegate`, the registry also holds
    /// a `delegate` tool whose sub-agents share `backend`.
    pub fn agent_config(
        &self,
        backend: Option<Arc<dyn CompletionBackend>>,
        pool: ToolRegistry,
        delegate: bool,
    ) -> AgentConfig {
        let tools = if delegate {
            with_delegate(pool, backend.clone(), None)
        } else {
            pool
        };
        let config = AgentConfig {
            backend,
            steering_instruction: self.steering_instruction.clone(),
            ..AgentConfig::default()
        };
        config
            .with_system_prompt(self.system_prompt.clone())
            .with_tools(Arc::new(tools))
            .with_orchestrator(self.orchestrator.build())
            .with_event_buffer(self.event_buffer)
    }
}

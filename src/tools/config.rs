//! Declarative tool configuration.
//!
//! A [`ToolConfig`] describes one tool independent of how it runs; `type`
//! selects the backend. Only `http` is executable today.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::http::HttpTool;
use super::registry::ToolRegistry;
use crate::error::{ConductorError, Result};

/// One configured tool, as found in JSON requests or the TOML config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// `http`, `mcp` or `command`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema shown to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<HttpAuthConfig>,
    /// e.g. `results[0]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_path: Option<String>,
    /// output key -> input key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_map: Option<HashMap<String, String>>,
}

/// Authentication for HTTP tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpAuthConfig {
    /// `bearer` or `apikey`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, rename = "apikey")]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

/// Build a registry holding one tool per config entry.
pub fn registry_from_config(configs: &[ToolConfig]) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for config in configs {
        match config.kind.as_str() {
            "http" => registry.register(Arc::new(HttpTool::from_config(config)?)),
            "mcp" | "command" => {
                return Err(ConductorError::Configuration(format!(
                    "tool type \"{}\" is not implemented (tool \"{}\")",
                    config.kind, config.name
                )))
            }
            other => {
                return Err(ConductorError::Configuration(format!(
                    "unknown tool type \"{other}\" (tool \"{}\")",
                    config.name
                )))
            }
        }
    }
    Ok(registry)
}

/// Parse a JSON array of tool configs.
pub fn parse_tool_configs(json: &str) -> Result<Vec<ToolConfig>> {
    Ok(serde_json::from_str(json)?)
}

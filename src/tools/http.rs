//! Tool backed by an HTTP endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use super::arguments::ToolArguments;
use super::config::{HttpAuthConfig, ToolConfig};
use super::tool::{Tool, ToolExecutionContext};
use super::types::AgentToolParameters;
use crate::error::ConductorError;
use crate::provider::http::shared_client;

/// Calls `endpoint` with the tool arguments and returns the decoded JSON reply.
#[derive(Debug, Clone)]
pub struct HttpTool {
    name: String,
    description: String,
    parameters: AgentToolParameters,
    endpoint: String,
    method: Method,
    auth: Option<HttpAuthConfig>,
    response_path: Option<String>,
    response_map: HashMap<String, String>,
}

impl HttpTool {
    /// Build from an `http` tool config. Name and endpoint are required.
    pub fn from_config(config: &ToolConfig) -> Result<Self, ConductorError> {
        if config.kind != "http" {
            return Err(ConductorError::Configuration(format!(
                "tool config type is \"{}\", not http",
                config.kind
            )));
        }
        let endpoint = config.endpoint.clone().unwrap_or_default();
        if config.name.is_empty() || endpoint.is_empty() {
            return Err(ConductorError::Configuration(
                "http tool requires name and endpoint".into(),
            ));
        }
        let method = match config.method.as_deref().filter(|m| !m.is_empty()) {
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes()).map_err(|_| {
                ConductorError::Configuration(format!("invalid http method: {m}"))
            })?,
            None => Method::POST,
        };
        let parameters = config
            .parameters
            .clone()
            .map(AgentToolParameters::from_schema)
            .unwrap_or_else(AgentToolParameters::empty);

        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            parameters,
            endpoint,
            method,
            auth: config.auth.clone(),
            response_path: config.response_path.clone().filter(|p| !p.is_empty()),
            response_map: config.response_map.clone().unwrap_or_default(),
        })
    }

    fn auth_header(&self) -> Option<(HeaderName, HeaderValue)> {
        let auth = self.auth.as_ref()?;
        if !matches!(auth.kind.as_str(), "bearer" | "apikey") {
            return None;
        }
        let name = match auth.header.as_deref().filter(|h| !h.is_empty()) {
            Some(header) => HeaderName::from_bytes(header.as_bytes()).ok()?,
            None => AUTHORIZATION,
        };
        let value = HeaderValue::from_str(&format!("Bearer {}", auth.api_key)).ok()?;
        Some((name, value))
    }
}

#[async_trait]
impl Tool for HttpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &AgentToolParameters {
        &self.parameters
    }

    fn validates_arguments(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<Value, ConductorError> {
        for required in self.parameters.required() {
            if args.raw().get(required).is_none() {
                return Err(ConductorError::tool(
                    &self.name,
                    format!("missing required parameter: {required}"),
                ));
            }
        }

        debug!(tool = %self.name, method = %self.method, endpoint = %self.endpoint, "http tool call");

        let mut request = shared_client().request(self.method.clone(), &self.endpoint);
        request = if self.method == Method::GET {
            let query: Vec<(String, String)> = args
                .raw()
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .map(|(k, v)| {
                            let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                            (k.clone(), v)
                        })
                        .collect()
                })
                .unwrap_or_default();
            request.query(&query)
        } else {
            request.json(args.raw())
        };
        if let Some((name, value)) = self.auth_header() {
            request = request.header(name, value);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ConductorError::tool(&self.name, e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConductorError::tool(
                &self.name,
                format!("http {}: {}", status.as_u16(), body),
            ));
        }

        let mut out: Value = resp
            .json()
            .await
            .map_err(|e| ConductorError::tool(&self.name, format!("invalid JSON response: {e}")))?;
        if let Some(path) = &self.response_path {
            out = extract_path(out, path);
        }
        if !self.response_map.is_empty() && !out.is_null() {
            out = apply_response_map(out, &self.response_map);
        }
        Ok(out)
    }
}

/// Follow a path like `data.results[0].name`. Missing keys or indexes yield `null`.
fn extract_path(value: Value, path: &str) -> Value {
    let mut current = value;
    for part in path.split(&['.', '[', ']'][..]).filter(|p| !p.is_empty()) {
        current = match current {
            Value::Object(mut map) => map.remove(part).unwrap_or(Value::Null),
            Value::Array(mut items) => match part.parse::<usize>() {
                Ok(i) if i < items.len() => items.swap_remove(i),
                _ => return Value::Null,
            },
            other => return other,
        };
    }
    current
}

/// Project an object: each output key takes the value of its input key.
fn apply_response_map(value: Value, mapping: &HashMap<String, String>) -> Value {
    let map = match value {
        Value::Object(map) => map,
        other => return other,
    };
    let projected = mapping
        .iter()
        .filter_map(|(out_key, in_key)| map.get(in_key).map(|v| (out_key.clone(), v.clone())))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_path_walks_objects_and_arrays() {
        let body = json!({"results": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(extract_path(body.clone(), "results[1].name"), json!("b"));
        assert_eq!(extract_path(body.clone(), "results[5]"), Value::Null);
        assert_eq!(extract_path(body, "missing"), Value::Null);
    }

    #[test]
    fn response_map_renames_keys() {
        let mapping = HashMap::from([("country".to_string(), "country_code".to_string())]);
        let out = apply_response_map(json!({"country_code": "NL", "other": 1}), &mapping);
        assert_eq!(out, json!({"country": "NL"}));
    }

    #[test]
    fn config_requires_endpoint() {
        let config = ToolConfig {
            kind: "http".into(),
            name: "lookup".into(),
            ..Default::default()
        };
        let err = HttpTool::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("requires name and endpoint"));
    }
}

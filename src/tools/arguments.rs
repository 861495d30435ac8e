//! Typed access to tool call arguments.

use crate::error::ConductorError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    /// Wrap raw arguments. A JSON-encoded string is decoded first; an empty string means `{}`.
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str::<serde_json::Value>(trimmed).unwrap_or(serde_json::Value::String(raw))
                }
            }
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };
        Self { value }
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ConductorError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ConductorError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// String elements of an array argument; absent or non-array yields an empty list.
    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.value
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_encoded_arguments_are_decoded() {
        let args = ToolArguments::new(json!(r#"{"expression":"1+1"}"#));
        assert_eq!(args.get_str("expression").unwrap(), "1+1");
    }

    #[test]
    fn null_and_blank_arguments_become_empty_object() {
        assert_eq!(ToolArguments::new(json!(null)).raw(), &json!({}));
        assert_eq!(ToolArguments::new(json!("  ")).raw(), &json!({}));
    }

    #[test]
    fn str_list_ignores_non_strings() {
        let args = ToolArguments::new(json!({"names": ["a", 1, "b"]}));
        assert_eq!(args.get_str_list("names"), vec!["a", "b"]);
        assert!(args.get_str_list("missing").is_empty());
    }

    #[test]
    fn missing_string_is_invalid_argument() {
        let args = ToolArguments::new(json!({}));
        let err = args.get_str("task").unwrap_err();
        assert!(matches!(err, ConductorError::InvalidArgument(_)));
    }
}

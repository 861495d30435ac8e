//! Small built-in tools: arithmetic and the current time.
//!
//! Each constructor returns an `Arc<dyn Tool>` built with [`AgentTool::new`].

use std::sync::Arc;

use chrono::Local;

use crate::error::ConductorError;
use crate::tools::tool::{AgentTool, Tool, ToolExecutionContext};
use crate::tools::types::AgentToolParameters;

/// `calculator`: evaluates one binary operation such as `2+2` or `10 / 4`.
pub fn calculator_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "calculator",
        "Performs basic arithmetic. Pass exactly one argument: 'expression' (required). \
         Supports +, -, *, / (e.g. '2+2', '10*5').",
        AgentToolParameters::object()
            .string(
                "expression",
                "The math expression to evaluate. Examples: '2+2', '15*3', '20-7', '10/2'.",
                true,
            )
            .build(),
        |args, _ctx: ToolExecutionContext| async move {
            let expression = args.get_str("expression")?;
            let result = evaluate(expression)
                .map_err(|message| ConductorError::tool("calculator", message))?;
            Ok(serde_json::json!({ "result": result }))
        },
    ))
}

/// `get_current_time`: local date, time and offset.
pub fn current_time_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "get_current_time",
        "Returns the current date and time",
        AgentToolParameters::empty(),
        |_args, _ctx: ToolExecutionContext| async move {
            let now = Local::now();
            Ok(serde_json::json!({
                "timestamp": now.timestamp(),
                "datetime": now.to_rfc3339(),
                "timezone": now.offset().to_string(),
            }))
        },
    ))
}

/// Both built-in tools.
pub fn all_tools() -> Vec<Arc<dyn Tool>> {
    vec![calculator_tool(), current_time_tool()]
}

/// Evaluate `left op right`. A leading minus belongs to the left operand.
fn evaluate(expression: &str) -> Result<f64, String> {
    let expr: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
    let split = expr
        .char_indices()
        .skip(1)
        .find(|(_, c)| matches!(c, '+' | '-' | '*' | '/'));
    let Some((at, op)) = split else {
        return Err("no operator found".to_string());
    };

    let (left, right) = (&expr[..at], &expr[at + 1..]);
    let left: f64 = left
        .parse()
        .map_err(|_| format!("invalid left operand: {left}"))?;
    let right: f64 = right
        .parse()
        .map_err(|_| format!("invalid right operand: {right}"))?;

    match op {
        '+' => Ok(left + right),
        '-' => Ok(left - right),
        '*' => Ok(left * right),
        '/' if right == 0.0 => Err("division by zero".to_string()),
        '/' => Ok(left / right),
        _ => Err("no operator found".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::arguments::ToolArguments;

    #[test]
    fn evaluates_binary_operations() {
        assert_eq!(evaluate("2+2"), Ok(4.0));
        assert_eq!(evaluate(" 15 * 3 "), Ok(45.0));
        assert_eq!(evaluate("-4-6"), Ok(-10.0));
        assert_eq!(evaluate("10/4"), Ok(2.5));
    }

    #[test]
    fn reports_bad_expressions() {
        assert_eq!(evaluate("1/0"), Err("division by zero".to_string()));
        assert_eq!(evaluate("42"), Err("no operator found".to_string()));
        assert!(evaluate("a+1").unwrap_err().contains("invalid left operand"));
    }

    #[tokio::test]
    async fn calculator_returns_result_object() {
        let tool = calculator_tool();
        let args = ToolArguments::new(serde_json::json!({"expression": "2+2"}));

        let value = tool.execute(&args, &ToolExecutionContext::default()).await.unwrap();

        assert_eq!(value, serde_json::json!({"result": 4.0}));
    }

    #[tokio::test]
    async fn calculator_surfaces_tool_error() {
        let tool = calculator_tool();
        let args = ToolArguments::new(serde_json::json!({"expression": "3/0"}));

        let err = tool.execute(&args, &ToolExecutionContext::default()).await.unwrap_err();

        assert_eq!(err.to_string(), "Tool execution error: calculator: division by zero");
    }

    #[tokio::test]
    async fn time_tool_reports_rfc3339() {
        let tool = current_time_tool();
        let value = tool
            .execute(&ToolArguments::new(serde_json::json!({})), &ToolExecutionContext::default())
            .await
            .unwrap();

        assert!(chrono::DateTime::parse_from_rfc3339(value["datetime"].as_str().unwrap()).is_ok());
    }
}

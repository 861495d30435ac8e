//! Dispatching a single tool call through a registry.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tools::{validation::validate_arguments, ToolArguments, ToolExecutionContext, ToolRegistry};
use crate::types::{ToolCall, ToolResultMessage};

/// Run one call. Every failure mode is folded into an is-error result.
pub async fn execute_tool_call(
    tools: Option<&ToolRegistry>,
    call: &ToolCall,
    cancel: &CancellationToken,
) -> ToolResultMessage {
    let Some(registry) = tools else {
        return ToolResultMessage::error(call, "tool registry not configured");
    };
    let Some(tool) = registry.get(&call.name) else {
        warn!(tool = %call.name, "tool not found");
        return ToolResultMessage::error(call, format!("tool not found: {}", call.name));
    };

    let args = ToolArguments::new(call.arguments.clone());
    if tool.validates_arguments() {
        if let Err(message) = validate_arguments(args.raw(), &tool.parameters().schema) {
            warn!(tool = %call.name, %message, "invalid tool arguments");
            return ToolResultMessage::error(call, message);
        }
    }

    debug!(tool = %call.name, id = %call.id, "executing tool");
    let ctx = ToolExecutionContext::new(call.id.clone(), cancel.clone());
    match tool.execute(&args, &ctx).await {
        Ok(value) => ToolResultMessage::success(call, value),
        Err(err) => {
            warn!(tool = %call.name, error = %err, "tool failed");
            ToolResultMessage::error(call, err.tool_message())
        }
    }
}

/// Run every call concurrently; results come back in request order.
///
/// Returns `None` if `cancel` fires before all calls finish.
pub async fn execute_round(
    tools: Option<&ToolRegistry>,
    calls: &[ToolCall],
    cancel: &CancellationToken,
) -> Option<Vec<ToolResultMessage>> {
    let round = join_all(calls.iter().map(|call| execute_tool_call(tools, call, cancel)));
    tokio::select! {
        results = round => Some(results),
        _ = cancel.cancelled() => None,
    }
}

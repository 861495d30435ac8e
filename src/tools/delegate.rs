//! Delegation to a freshly built sub-agent.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use super::arguments::ToolArguments;
use super::registry::ToolRegistry;
use super::tool::{Tool, ToolExecutionContext};
use super::types::AgentToolParameters;
use crate::agent::{Agent, AgentConfig};
use crate::agent_loop::AgentEvent;
use crate::error::ConductorError;
use crate::provider::CompletionBackend;
use crate::stream::{event_stream, DEFAULT_CAPACITY};
use crate::transform::Pipeline;
use crate::types::last_assistant_text;

pub const DELEGATE_TOOL_NAME: &str = "delegate";

const MAX_THINKING_CHARS: usize = 80;

/// Runs one turn of a sub-agent with its own persona and a subset of a tool pool.
///
/// Never fails: problems come back in the `error` field together with a
/// line-per-event trace of what the sub-agent did.
pub struct DelegateTool {
    backend: Option<Arc<dyn CompletionBackend>>,
    pipeline: Option<Pipeline>,
    pool: Arc<ToolRegistry>,
    parameters: AgentToolParameters,
}

impl DelegateTool {
    pub fn new(
        backend: Option<Arc<dyn CompletionBackend>>,
        pipeline: Option<Pipeline>,
        pool: Arc<ToolRegistry>,
    ) -> Self {
        let parameters = AgentToolParameters::object()
            .string(
                "task",
                "The instruction to send to the sub-agent as the single user message.",
                true,
            )
            .string(
                "system_prompt",
                "Persona or system context for the sub-agent (e.g. 'You are a math expert.').",
                true,
            )
            .string_array(
                "tool_names",
                "Optional. Names of tools the sub-agent can use. If empty or omitted, the sub-agent gets all tools from the pool.",
                false,
            )
            .string(
                "context_excerpt",
                "Optional. Additional context to append to the task for the sub-agent.",
                false,
            )
            .build();
        Self {
            backend,
            pipeline,
            pool,
            parameters,
        }
    }

    /// Pool subset by name; everything when `names` is empty. Never includes `delegate`.
    pub fn sub_registry(&self, names: &[String]) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        let picked = if names.is_empty() {
            self.pool.all()
        } else {
            names.iter().filter_map(|name| self.pool.get(name)).collect()
        };
        for tool in picked {
            if tool.name() != DELEGATE_TOOL_NAME {
                registry.register(tool);
            }
        }
        registry
    }
}

impl std::fmt::Debug for DelegateTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegateTool")
            .field("pool", &self.pool.list_names())
            .finish()
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        DELEGATE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Delegate a task to a sub-agent with a dedicated persona (system prompt) and an optional set of tools. Use when a specialized agent should perform a focused task. Returns the sub-agent's response."
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
        ctx: &ToolExecutionContext,
    ) -> Result<Value, ConductorError> {
        let task = args.get_str_opt("task").unwrap_or_default();
        let system_prompt = args.get_str_opt("system_prompt").unwrap_or_default();
        if task.is_empty() || system_prompt.is_empty() {
            return Ok(failure("task and system_prompt are required", ""));
        }
        let task = match args.get_str_opt("context_excerpt").filter(|s| !s.is_empty()) {
            Some(excerpt) => format!("{}\n\n{excerpt}", task.trim()),
            None => task.to_string(),
        };
        let names = args.get_str_list("tool_names");

        let tools = self.sub_registry(&names);
        debug!(tools = ?tools.list_names(), "delegating to sub-agent");
        let mut config = AgentConfig::default()
            .with_system_prompt(system_prompt)
            .with_tools(Arc::new(tools));
        config.backend = self.backend.clone();
        config.pipeline = self.pipeline.clone();
        let sub_agent = Agent::new(config);

        let (sender, stream) = event_stream(DEFAULT_CAPACITY);
        let outcome = stream.outcome();
        let trace = tokio::spawn(async move {
            stream
                .map(|event| trace_line(&event))
                .collect::<Vec<String>>()
                .await
        });

        sub_agent
            .run_prompt(task, ctx.cancel.child_token(), sender)
            .await;
        let result = outcome.wait().await;
        let thinking = trace.await.unwrap_or_default().join("\n");

        let messages = match result {
            Ok(messages) => messages,
            Err(err) => return Ok(failure(&format!("sub-agent failed: {err}"), &thinking)),
        };
        match last_assistant_text(&messages).filter(|text| !text.is_empty()) {
            Some(response) => {
                let mut out = json!({ "response": response, "error": "" });
                if !thinking.is_empty() {
                    out["thinking"] = Value::String(thinking);
                }
                Ok(out)
            }
            None => Ok(failure("sub-agent produced no assistant text", &thinking)),
        }
    }
}

/// `pool` plus a `delegate` tool whose sub-agents draw from `pool`.
pub fn with_delegate(
    pool: ToolRegistry,
    backend: Option<Arc<dyn CompletionBackend>>,
    pipeline: Option<Pipeline>,
) -> ToolRegistry {
    let pool = Arc::new(pool);
    let mut registry = ToolRegistry::clone(&pool);
    registry.register(Arc::new(DelegateTool::new(backend, pipeline, pool)));
    registry
}

fn failure(message: &str, thinking: &str) -> Value {
    let mut out = json!({ "response": "", "error": message });
    if !thinking.is_empty() {
        out["thinking"] = Value::String(thinking.to_string());
    }
    out
}

/// One compact trace line per sub-agent event.
pub fn trace_line(event: &AgentEvent) -> String {
    match event {
        AgentEvent::TurnStart { .. } => "turn_start".to_string(),
        AgentEvent::SteeringMode { mode, .. } => mode.to_string(),
        AgentEvent::ToolCall { tool_name, .. } => format!("tool: {tool_name}"),
        AgentEvent::ToolResult {
            tool_name, error, ..
        } => match error {
            Some(_) => format!("result: {tool_name} (error)"),
            None => format!("result: {tool_name}"),
        },
        AgentEvent::Thinking { text } => {
            if text.chars().count() > MAX_THINKING_CHARS {
                let head: String = text.chars().take(MAX_THINKING_CHARS).collect();
                format!("thinking: {head}...")
            } else {
                format!("thinking: {text}")
            }
        }
        AgentEvent::TextDelta { .. } => "output".to_string(),
        AgentEvent::TurnEnd { .. } => "turn_end".to_string(),
        AgentEvent::PlanCreated { step_count, .. } => format!("plan_created: {step_count} step(s)"),
        AgentEvent::PlanStepStart { tool, .. } => format!("plan_step: {tool}"),
        AgentEvent::PlanStepEnd { tool, error, .. } => match error {
            Some(_) => format!("plan_step_done: {tool} (error)"),
            None => format!("plan_step_done: {tool}"),
        },
    }
}

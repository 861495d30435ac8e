//! Single-call "respond or use tools" decisions.

use tracing::debug;

use super::events::SteeringMode;
use crate::agent::ContextSnapshot;
use crate::error::{ConductorError, Result};
use crate::provider::{CompletionBackend, CompletionRequest};
use crate::tools::ToolRegistry;
use crate::transform::Pipeline;
use crate::types::{ToolCall, Usage};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

pub const DEFAULT_INITIAL_INSTRUCTION: &str = "When the user's query can be answered using the available tools, you MUST call the appropriate tool(s) first\u{2014}do not answer with text alone. After you have tool results, provide a concise final response. For other queries, provide helpful, concise responses.";

pub const FOLLOW_UP_INSTRUCTION: &str = "You have just received tool results. Based on these results, decide:
1. If the task requires MORE tool calls (for example the user asked for several items and you have results for only some), call tools for the remaining items. Do NOT give a final answer until you have tool results for everything requested.
2. If you have ENOUGH information from the tools, give the final natural language response to the user as text only.
3. If the task cannot be completed with the available tools or results, say so clearly. Never invent or guess results.
Do NOT repeat a tool call whose results you already have.";

const TEMPERATURE: f64 = 0.7;
const MAX_TOKENS: u32 = 1000;

/// Outcome of one steering call.
#[derive(Debug, Clone, PartialEq)]
pub enum SteeringDecision {
    Respond {
        text: String,
        model: String,
        usage: Option<Usage>,
    },
    Steer {
        calls: Vec<ToolCall>,
        rationale: Option<String>,
        model: String,
        usage: Option<Usage>,
    },
}

impl SteeringDecision {
    pub fn respond(text: impl Into<String>) -> Self {
        Self::Respond {
            text: text.into(),
            model: String::new(),
            usage: None,
        }
    }

    pub fn mode(&self) -> SteeringMode {
        match self {
            Self::Respond { .. } => SteeringMode::Respond,
            Self::Steer { .. } => SteeringMode::Steer,
        }
    }

    /// Number of tool calls queued by this decision.
    pub fn queue_size(&self) -> usize {
        match self {
            Self::Respond { .. } => 0,
            Self::Steer { calls, .. } => calls.len(),
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Respond { model, .. } | Self::Steer { model, .. } => model,
        }
    }

    pub fn usage(&self) -> Option<&Usage> {
        match self {
            Self::Respond { usage, .. } | Self::Steer { usage, .. } => usage.as_ref(),
        }
    }
}

/// System prompt for a steering call.
pub fn steering_prompt(base: &str, follow_up: bool, instruction: Option<&str>) -> String {
    let base = if base.is_empty() { DEFAULT_SYSTEM_PROMPT } else { base };
    let suffix = if follow_up {
        FOLLOW_UP_INSTRUCTION
    } else {
        instruction
            .filter(|text| !text.is_empty())
            .unwrap_or(DEFAULT_INITIAL_INSTRUCTION)
    };
    format!("{base}\n\n{suffix}")
}

/// Everything a steering call reads besides the conversation itself.
#[derive(Clone, Copy)]
pub struct SteeringDecider<'a> {
    pub backend: Option<&'a dyn CompletionBackend>,
    pub pipeline: Option<&'a Pipeline>,
    pub tools: Option<&'a ToolRegistry>,
    /// Replaces [`DEFAULT_INITIAL_INSTRUCTION`] on the first call of a turn.
    pub instruction: Option<&'a str>,
}

impl SteeringDecider<'_> {
    pub async fn decide(
        &self,
        snapshot: &ContextSnapshot,
        follow_up: bool,
    ) -> Result<SteeringDecision> {
        let Some(backend) = self.backend else {
            return Ok(SteeringDecision::respond(""));
        };

        let messages = match self.pipeline {
            Some(pipeline) => pipeline.run(snapshot.messages.clone()).await,
            None => Pipeline::default().run(snapshot.messages.clone()).await,
        }
        .map_err(|err| match err {
            ConductorError::Transform(_) => err,
            other => ConductorError::Transform(other.to_string()),
        })?;

        let tools = self.tools.map(ToolRegistry::definitions).unwrap_or_default();
        debug!(
            backend = backend.name(),
            messages = messages.len(),
            tools = tools.len(),
            follow_up,
            "steering decision"
        );
        let request = CompletionRequest::builder()
            .system_prompt(steering_prompt(&snapshot.system_prompt, follow_up, self.instruction))
            .messages(messages)
            .temperature(TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .tools(tools)
            .build();

        let response = backend
            .complete(&request)
            .await
            .map_err(|err| ConductorError::backend("steering decision failed", err))?;

        let usage = Some(response.usage);
        if response.tool_calls.is_empty() {
            return Ok(SteeringDecision::Respond {
                text: response.text,
                model: response.model,
                usage,
            });
        }

        let calls: Vec<ToolCall> = response
            .tool_calls
            .into_iter()
            .map(|mut call| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", uuid::Uuid::new_v4().simple());
                }
                call
            })
            .collect();
        let names: Vec<&str> = calls.iter().map(|call| call.name.as_str()).collect();
        let rationale = format!("I'll use {} to help answer this.", names.join(", "));
        debug!(calls = calls.len(), "steering to tools");
        Ok(SteeringDecision::Steer {
            calls,
            rationale: Some(rationale),
            model: response.model,
            usage,
        })
    }
}

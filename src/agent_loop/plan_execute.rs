//! Plan-and-execute: one planning call, sequential steps, one synthesis call.

use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::events::{AgentEvent, PlannedCall};
use super::steering::DEFAULT_SYSTEM_PROMPT;
use super::turn::TurnContext;
use super::Orchestrator;
use crate::error::{ConductorError, Result};
use crate::provider::{CompletionBackend, CompletionRequest, CompletionResponse};
use crate::tools::ToolRegistry;
use crate::transform::Pipeline;
use crate::types::{AssistantMessage, ToolCall};

const NO_BACKEND: &str = "plan-and-execute: no completion backend configured";
const EMPTY_SYNTHESIS: &str = "I've completed the steps.";

static FENCED_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();

fn fenced_block() -> Option<&'static Regex> {
    FENCED_BLOCK
        .get_or_init(|| Regex::new(r"(?s)\s*```(?:json)?\s*(.*?)```\s*").ok())
        .as_ref()
}

/// One planned tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    #[serde(default = "empty_args")]
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn empty_args() -> serde_json::Value {
    serde_json::json!({})
}

/// Ordered steps produced by the planning call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Parse planner output, tolerating a surrounding code fence. Blank text is an empty plan.
    pub fn parse(text: &str) -> Result<Self> {
        let mut body = text.trim();
        if body.is_empty() {
            return Ok(Self::default());
        }
        if let Some(inner) = fenced_block()
            .and_then(|re| re.captures(body))
            .and_then(|caps| caps.get(1))
        {
            body = inner.as_str().trim();
        }
        serde_json::from_str(body).map_err(|err| ConductorError::PlanParse(err.to_string()))
    }
}

pub fn planning_prompt(base: &str, tools: Option<&ToolRegistry>) -> String {
    let base = if base.is_empty() { DEFAULT_SYSTEM_PROMPT } else { base };
    let mut listing: Vec<String> = tools
        .map(|registry| {
            registry
                .all()
                .iter()
                .map(|tool| format!("{}: {}", tool.name(), tool.description()))
                .collect()
        })
        .unwrap_or_default();
    listing.sort();
    let listing = if listing.is_empty() {
        "No tools available.".to_string()
    } else {
        listing.join("\n")
    };
    format!(
        "{base}\n\nYou must output a JSON plan for the user's request using ONLY the following tools:\n\
         {listing}\n\n\
         Output a single JSON object with this exact format (no other text):\n\
         {{\"steps\":[{{\"tool\":\"<tool_name>\",\"args\":{{...}}}}, ...]}}\n\
         Use only the tool names listed above. If no tools are needed, use: {{\"steps\":[]}}."
    )
}

pub fn synthesis_prompt(base: &str) -> String {
    let base = if base.is_empty() { DEFAULT_SYSTEM_PROMPT } else { base };
    format!(
        "{base}\n\nYou have executed a plan and received tool results. Provide a concise, natural \
         language summary for the user based on the conversation and the tool results. Do not \
         repeat raw JSON or tool internals."
    )
}

/// Plan every tool call up front, run the steps in order, then summarize.
///
/// Backend failures end the turn with an error; a malformed plan does not.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanExecuteOrchestrator;

#[async_trait]
impl Orchestrator for PlanExecuteOrchestrator {
    fn name(&self) -> &str {
        "plan-execute"
    }

    async fn run(&self, turn: &mut TurnContext<'_>) {
        let started = Instant::now();
        turn.emit(AgentEvent::TurnStart {
            timestamp: Utc::now().timestamp_millis(),
        })
        .await;

        let Some(backend) = turn.config.backend.clone() else {
            turn.fail(ConductorError::Configuration(NO_BACKEND.into()));
            return;
        };
        let pipeline = turn.config.pipeline.clone().unwrap_or_default();

        let planning = {
            let snapshot = turn.state.snapshot();
            let prompt = planning_prompt(&snapshot.system_prompt, turn.tools());
            complete(backend.as_ref(), &pipeline, snapshot.messages, prompt, 0.3, 2000)
                .await
                .map_err(|err| ConductorError::backend("plan-and-execute: planning call", err))
        };
        let planning = match planning {
            Ok(response) => response,
            Err(err) => {
                turn.state.set_error(err.to_string());
                turn.fail(err);
                return;
            }
        };

        let plan = match Plan::parse(&planning.text) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "unusable plan, continuing without steps");
                turn.state.set_error(err.to_string());
                Plan::default()
            }
        };
        let step_count = plan.steps.len();
        debug!(steps = step_count, "plan created");
        turn.emit(AgentEvent::PlanCreated {
            step_count,
            steps: plan
                .steps
                .iter()
                .map(|step| PlannedCall {
                    tool: step.tool.clone(),
                    args: step.args.clone(),
                })
                .collect(),
        })
        .await;

        if !planning.text.is_empty() {
            turn.state.push(
                AssistantMessage::text(planning.text.clone())
                    .with_origin(backend.name(), planning.model.as_str()),
            );
        }

        let calls: Vec<ToolCall> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                ToolCall::new(format!("plan-step-{index}"), step.tool.clone(), step.args.clone())
            })
            .collect();
        if !calls.is_empty() {
            turn.state.push(
                AssistantMessage::tool_use(&calls)
                    .with_origin(backend.name(), planning.model.as_str()),
            );
        }

        for (index, call) in calls.iter().enumerate() {
            if turn.is_canceled() {
                turn.abort();
                return;
            }
            turn.emit(AgentEvent::PlanStepStart {
                index,
                step_count,
                tool: call.name.clone(),
                args: call.arguments.clone(),
            })
            .await;
            turn.emit(AgentEvent::tool_call(call)).await;

            turn.state.mark_pending(call.id.clone());
            let result = turn.execute_tool(call).await;
            turn.state.clear_pending(&call.id);

            turn.emit(AgentEvent::tool_result(&result)).await;
            turn.emit(AgentEvent::PlanStepEnd {
                index,
                step_count,
                tool: call.name.clone(),
                result: result.payload(),
                error: result.error_text(),
            })
            .await;
            turn.state.push(result);
        }

        if turn.is_canceled() {
            turn.abort();
            return;
        }
        let synthesis = {
            let snapshot = turn.state.snapshot();
            let prompt = synthesis_prompt(&snapshot.system_prompt);
            complete(backend.as_ref(), &pipeline, snapshot.messages, prompt, 0.5, 1000)
                .await
                .map_err(|err| ConductorError::backend("plan-and-execute: synthesis call", err))
        };
        let synthesis = match synthesis {
            Ok(response) => response,
            Err(err) => {
                turn.state.set_error(err.to_string());
                turn.fail(err);
                return;
            }
        };

        let text = if synthesis.text.is_empty() {
            EMPTY_SYNTHESIS.to_string()
        } else {
            synthesis.text
        };
        let mut message = AssistantMessage::text(text).with_origin(backend.name(), synthesis.model);
        let mut usage = planning.usage;
        usage.merge(&synthesis.usage);
        message.usage = Some(usage);
        turn.respond(message, started).await;
        turn.finish();
    }
}

/// One tool-less completion call over the transformed history.
async fn complete(
    backend: &dyn CompletionBackend,
    pipeline: &Pipeline,
    messages: Vec<crate::types::Message>,
    system_prompt: String,
    temperature: f64,
    max_tokens: u32,
) -> Result<CompletionResponse> {
    let messages = pipeline.run(messages).await?;
    debug!(
        backend = backend.name(),
        messages = messages.len(),
        temperature,
        "plan-execute completion"
    );
    let request = CompletionRequest::builder()
        .system_prompt(system_prompt)
        .messages(messages)
        .temperature(temperature)
        .max_tokens(max_tokens)
        .build();
    backend.complete(&request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn parses_bare_and_fenced_plans() {
        let bare = Plan::parse(r#"{"steps":[{"tool":"calculator","args":{"expression":"1+1"}}]}"#)
            .unwrap();
        assert_eq!(bare.steps.len(), 1);
        assert_eq!(bare.steps[0].args, json!({"expression": "1+1"}));

        let fenced = Plan::parse(
            "Here you go:\n```json\n{\"steps\":[{\"tool\":\"get_current_time\",\"reason\":\"clock\"}]}\n```\n",
        )
        .unwrap();
        assert_eq!(
            fenced.steps,
            vec![PlanStep {
                tool: "get_current_time".into(),
                args: json!({}),
                reason: Some("clock".into()),
            }]
        );
    }

    #[test]
    fn blank_text_is_empty_plan_and_garbage_is_an_error() {
        assert_eq!(Plan::parse("   \n").unwrap(), Plan::default());
        assert_eq!(Plan::parse(r#"{"other":1}"#).unwrap(), Plan::default());

        let err = Plan::parse("I think we should add the numbers").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse plan: "));
    }

    #[test]
    fn planning_prompt_lists_tools() {
        let registry = ToolRegistry::new()
            .with_tool(builtin::calculator_tool())
            .with_tool(builtin::current_time_tool());

        let prompt = planning_prompt("", Some(&registry));

        assert!(prompt.starts_with("You are a helpful AI assistant.\n\n"));
        assert!(prompt.contains("\ncalculator: "));
        assert!(prompt.contains("\nget_current_time: "));
        assert!(prompt.contains(r#"{"steps":[]}"#));
        assert!(planning_prompt("Base.", None).contains("No tools available."));
    }

    #[test]
    fn synthesis_prompt_keeps_base() {
        assert!(synthesis_prompt("Persona.").starts_with("Persona.\n\nYou have executed a plan"));
    }
}

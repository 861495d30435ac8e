//! Events published while a turn runs.

use serde::{Deserialize, Serialize};

use crate::types::{AssistantMessage, ToolCall, ToolResultMessage};

/// Which branch a steering decision took.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SteeringMode {
    Respond,
    Steer,
}

/// One planned tool invocation as announced to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedCall {
    pub tool: String,
    pub args: serde_json::Value,
}

/// Progress of a turn.
///
/// Serialized as `{"type": "...", "payload": {...}}`. Observers only; the
/// orchestrator never reads these back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AgentEvent {
    TurnStart {
        /// Milliseconds since the Unix epoch.
        timestamp: i64,
    },
    TextDelta {
        text: String,
        index: usize,
    },
    Thinking {
        text: String,
    },
    SteeringMode {
        mode: SteeringMode,
        queue_size: usize,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    TurnEnd {
        message: AssistantMessage,
        duration_ms: u64,
    },
    PlanCreated {
        step_count: usize,
        steps: Vec<PlannedCall>,
    },
    PlanStepStart {
        index: usize,
        step_count: usize,
        tool: String,
        args: serde_json::Value,
    },
    PlanStepEnd {
        index: usize,
        step_count: usize,
        tool: String,
        result: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AgentEvent {
    /// The `type` tag, e.g. `tool_call`.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    pub fn tool_call(call: &ToolCall) -> Self {
        Self::ToolCall {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
        }
    }

    pub fn tool_result(result: &ToolResultMessage) -> Self {
        Self::ToolResult {
            tool_call_id: result.tool_call_id.clone(),
            tool_name: result.tool_name.clone(),
            result: result.payload(),
            error: result.error_text(),
        }
    }
}

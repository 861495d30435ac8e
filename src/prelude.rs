//! Convenience re-exports for common use.

pub use crate::agent::{Agent, AgentConfig, MessageQueue};
pub use crate::agent_loop::{AgentEvent, Orchestrator, OrchestratorKind, SteeringMode};
pub use crate::config::ConductorConfig;
pub use crate::error::{ConductorError, Result};
pub use crate::provider::{CompletionBackend, CompletionRequest, CompletionResponse};
pub use crate::stream::{event_stream, EventSender, EventStream};
pub use crate::tools::{AgentTool, AgentToolParameters, Tool, ToolArguments, ToolRegistry};
pub use crate::transform::Pipeline;
pub use crate::types::{AssistantMessage, Message, StopReason, ToolCall, ToolResultMessage, Usage};

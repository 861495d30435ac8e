//! Completion backend trait and implementations.

pub mod http;

#[cfg(feature = "openai-compatible")]
pub mod openai_compatible;

#[cfg(feature = "openai-compatible")]
pub use openai_compatible::OpenAiCompatibleBackend;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::ConductorError;
use crate::tools::ToolDefinition;
use crate::types::{LlmMessage, ToolCall, Usage};

/// OpenRouter's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// One completion call.
#[derive(Debug, Clone, bon::Builder)]
pub struct CompletionRequest {
    #[builder(into)]
    pub system_prompt: String,
    pub messages: Vec<LlmMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Tool schemas offered to the model; empty means no tools.
    #[builder(default)]
    pub tools: Vec<ToolDefinition>,
}

/// Result of a non-streaming completion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Model identifier reported by the backend, possibly empty.
    pub model: String,
    pub usage: Usage,
}

/// One event of a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendStreamEvent {
    Start { model: String },
    TextDelta(String),
    /// Fragment of a tool call; `arguments` is a partial JSON string.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// A fully assembled tool call.
    ToolCall(ToolCall),
    Done { usage: Option<Usage> },
    Error(String),
}

/// Anything that can answer a completion request.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short backend name, recorded on assistant messages.
    fn name(&self) -> &str;

    /// Run one completion and return the whole response.
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ConductorError>;

    /// Stream a completion. Orchestrators only use [`complete`](Self::complete).
    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<BackendStreamEvent, ConductorError>>, ConductorError>;
}

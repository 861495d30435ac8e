//! Per-turn handle passed to an orchestrator.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::events::AgentEvent;
use super::execute::{execute_round, execute_tool_call};
use super::steering::{SteeringDecider, SteeringDecision};
use crate::agent::{AgentConfig, ConversationState, MessageQueue};
use crate::error::{ConductorError, Result};
use crate::stream::EventSender;
use crate::tools::ToolRegistry;
use crate::types::{AssistantMessage, Message, ToolCall, ToolResultMessage};

/// Producer side of a turn's event stream.
pub type TurnSender = EventSender<AgentEvent, Vec<Message>>;

/// Exclusive access to one session for the duration of a turn.
pub struct TurnContext<'a> {
    pub config: &'a AgentConfig,
    pub state: &'a mut ConversationState,
    pub cancel: CancellationToken,
    pub events: TurnSender,
    pub steering: &'a MessageQueue,
    pub follow_up: &'a MessageQueue,
}

impl TurnContext<'_> {
    pub async fn emit(&self, event: AgentEvent) {
        self.events.push(event).await;
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Settle the stream as canceled. Nothing else may happen afterwards.
    pub fn abort(&self) {
        self.events.end_with_error(ConductorError::Canceled);
    }

    /// Settle the stream with the full history.
    pub fn finish(&self) {
        self.events.end(self.state.messages().to_vec());
    }

    pub fn fail(&self, error: ConductorError) {
        self.events.end_with_error(error);
    }

    pub fn tools(&self) -> Option<&ToolRegistry> {
        self.config.tools.as_deref()
    }

    /// Name of the configured backend, or empty.
    pub fn backend_name(&self) -> String {
        self.config
            .backend
            .as_ref()
            .map(|backend| backend.name().to_string())
            .unwrap_or_default()
    }

    pub fn decider(&self) -> SteeringDecider<'_> {
        SteeringDecider {
            backend: self.config.backend.as_deref(),
            pipeline: self.config.pipeline.as_ref(),
            tools: self.tools(),
            instruction: self.config.steering_instruction.as_deref(),
        }
    }

    /// One steering call against a fresh snapshot.
    pub async fn decide(&self, follow_up: bool) -> Result<SteeringDecision> {
        let snapshot = self.state.snapshot();
        self.decider().decide(&snapshot, follow_up).await
    }

    /// Record a recoverable failure on the session.
    pub fn record_error(&mut self, error: &ConductorError) {
        warn!(error = %error, "recovered turn failure");
        self.state.set_error(error.to_string());
    }

    pub async fn execute_tool(&self, call: &ToolCall) -> ToolResultMessage {
        execute_tool_call(self.tools(), call, &self.cancel).await
    }

    /// Concurrent round; `None` once canceled.
    pub async fn execute_round(&self, calls: &[ToolCall]) -> Option<Vec<ToolResultMessage>> {
        execute_round(self.tools(), calls, &self.cancel).await
    }

    /// Stream `text` word by word, each chunk followed by one space.
    pub async fn emit_text_deltas(&mut self, text: &str) {
        self.state.set_streaming(true);
        for (index, word) in text.split_whitespace().enumerate() {
            self.events
                .push(AgentEvent::TextDelta {
                    text: format!("{word} "),
                    index,
                })
                .await;
        }
        self.state.set_streaming(false);
    }

    /// Append the final answer, stream it and close the turn.
    pub async fn respond(&mut self, message: AssistantMessage, started: Instant) {
        self.state.push(message.clone());
        let text = message.text_content();
        self.emit_text_deltas(&text).await;
        self.emit(AgentEvent::TurnEnd {
            message,
            duration_ms: started.elapsed().as_millis() as u64,
        })
        .await;
    }
}

//! Caller-facing agent session.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::queue::MessageQueue;
use super::state::{ContextSnapshot, ConversationState, SessionStatus};
use crate::agent_loop::{execute_tool_call, AgentEvent, Orchestrator, ReactiveOrchestrator, TurnContext, TurnSender};
use crate::provider::CompletionBackend;
use crate::stream::{event_stream, EventStream, DEFAULT_CAPACITY};
use crate::tools::ToolRegistry;
use crate::transform::Pipeline;
use crate::types::{Message, ToolCall, ToolResultMessage};

/// Everything a session needs besides its history.
#[derive(Clone)]
pub struct AgentConfig {
    pub system_prompt: String,
    /// `None` makes the reactive strategy a no-op responder.
    pub backend: Option<Arc<dyn CompletionBackend>>,
    pub tools: Option<Arc<ToolRegistry>>,
    pub pipeline: Option<Pipeline>,
    pub orchestrator: Arc<dyn Orchestrator>,
    /// Overrides the default instruction of the first steering call.
    pub steering_instruction: Option<String>,
    pub event_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            backend: None,
            tools: None,
            pipeline: None,
            orchestrator: Arc::new(ReactiveOrchestrator),
            steering_instruction: None,
            event_buffer: DEFAULT_CAPACITY,
        }
    }
}

impl AgentConfig {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend: Some(backend),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<dyn Orchestrator>) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn with_steering_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.steering_instruction = Some(instruction.into());
        self
    }

    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("system_prompt", &self.system_prompt)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .field("tools", &self.tools)
            .field("orchestrator", &self.orchestrator.name())
            .field("event_buffer", &self.event_buffer)
            .finish()
    }
}

/// A conversation with one model, driven one turn at a time.
///
/// Cheap to clone; clones share history and queues. Turns are serialized by
/// the state lock, so a second `prompt` waits for the first to finish.
///
/// ```ignore
/// let agent = Agent::new(AgentConfig::new(backend).with_tools(registry));
/// let (events, history) = agent.prompt("What is 2+2?").collect().await;
/// ```
#[derive(Clone)]
pub struct Agent {
    config: Arc<AgentConfig>,
    state: Arc<Mutex<ConversationState>>,
    status: watch::Receiver<SessionStatus>,
    steering: MessageQueue,
    follow_up: MessageQueue,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let state = ConversationState::new(config.system_prompt.clone(), config.tools.clone());
        let status = state.subscribe();
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(state)),
            status,
            steering: MessageQueue::new(),
            follow_up: MessageQueue::new(),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Start a turn on a background task.
    pub fn prompt(&self, message: impl Into<String>) -> EventStream<AgentEvent, Vec<Message>> {
        self.prompt_with_cancel(message, CancellationToken::new())
    }

    pub fn prompt_with_cancel(
        &self,
        message: impl Into<String>,
        cancel: CancellationToken,
    ) -> EventStream<AgentEvent, Vec<Message>> {
        let (sender, stream) = event_stream(self.config.event_buffer);
        let agent = self.clone();
        let message = message.into();
        tokio::spawn(async move {
            agent.run_prompt(message, cancel, sender).await;
        });
        stream
    }

    /// Run a whole turn on the current task, publishing into `sender`.
    ///
    /// The caller must drain the matching stream concurrently once more than
    /// `event_buffer` events may be produced.
    pub async fn run_prompt(
        &self,
        message: impl Into<String>,
        cancel: CancellationToken,
        sender: TurnSender,
    ) {
        let mut state = self.state.lock().await;
        state.push(Message::user(message));
        debug!(
            orchestrator = self.config.orchestrator.name(),
            messages = state.messages().len(),
            "turn started"
        );

        let mut turn = TurnContext {
            config: &self.config,
            state: &mut state,
            cancel,
            events: sender.clone(),
            steering: &self.steering,
            follow_up: &self.follow_up,
        };
        self.config.orchestrator.run(&mut turn).await;

        if !sender.is_settled() {
            sender.end(state.messages().to_vec());
        }
    }

    /// Queue a message that interrupts the next tool round.
    pub fn steer(&self, message: impl Into<Message>) {
        self.steering.push(message);
    }

    /// Queue a message that starts another turn after the current answer.
    pub fn follow_up(&self, message: impl Into<Message>) {
        self.follow_up.push(message);
    }

    /// Waits for any running turn.
    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages().to_vec()
    }

    /// Waits for any running turn.
    pub async fn snapshot(&self) -> ContextSnapshot {
        self.state.lock().await.snapshot()
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    pub fn pending_tool_calls(&self) -> Vec<String> {
        self.status.borrow().pending_tool_calls.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.status.borrow().is_streaming
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes without taking the state lock.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Clear history, flags and queued messages.
    pub async fn reset(&self) {
        self.state.lock().await.reset();
        self.steering.clear();
        self.follow_up.clear();
    }

    /// Run one tool call against the session's registry, outside any turn.
    pub async fn execute_tool(&self, call: &ToolCall, cancel: &CancellationToken) -> ToolResultMessage {
        execute_tool_call(self.config.tools.as_deref(), call, cancel).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("config", &self.config)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

//! Conversation state owned by one session.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;

use crate::tools::{ToolLister, ToolRegistry};
use crate::types::Message;

/// Lock-free view of the flags a running turn flips.
///
/// Published on a `watch` channel so callers can read it while the turn holds
/// the state lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub message_count: usize,
    pub pending_tool_calls: Vec<String>,
    pub is_streaming: bool,
    pub last_error: Option<String>,
}

/// Immutable copy of the conversation taken before a backend call.
#[derive(Clone)]
pub struct ContextSnapshot {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Option<Arc<dyn ToolLister>>,
}

impl ContextSnapshot {
    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .as_ref()
            .map(|tools| tools.list_tools())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ContextSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextSnapshot")
            .field("system_prompt", &self.system_prompt)
            .field("messages", &self.messages.len())
            .field("tools", &self.tool_names())
            .finish()
    }
}

/// Append-only history plus turn bookkeeping.
///
/// Only the orchestrator mutates it, and only while holding the session lock.
#[derive(Debug)]
pub struct ConversationState {
    system_prompt: String,
    tools: Option<Arc<ToolRegistry>>,
    messages: Vec<Message>,
    pending_tool_calls: BTreeSet<String>,
    is_streaming: bool,
    last_error: Option<String>,
    status: watch::Sender<SessionStatus>,
}

impl ConversationState {
    pub fn new(system_prompt: impl Into<String>, tools: Option<Arc<ToolRegistry>>) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            system_prompt: system_prompt.into(),
            tools,
            messages: Vec::new(),
            pending_tool_calls: BTreeSet::new(),
            is_streaming: false,
            last_error: None,
            status,
        }
    }

    /// Receiver that tracks [`SessionStatus`] changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> Option<&Arc<ToolRegistry>> {
        self.tools.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: impl Into<Message>) {
        self.messages.push(message.into());
        self.publish();
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.publish();
    }

    pub fn mark_pending(&mut self, tool_call_id: impl Into<String>) {
        self.pending_tool_calls.insert(tool_call_id.into());
        self.publish();
    }

    pub fn clear_pending(&mut self, tool_call_id: &str) {
        if self.pending_tool_calls.remove(tool_call_id) {
            self.publish();
        }
    }

    pub fn pending_tool_calls(&self) -> Vec<String> {
        self.pending_tool_calls.iter().cloned().collect()
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.is_streaming = streaming;
        self.publish();
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.publish();
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            system_prompt: self.system_prompt.clone(),
            messages: self.messages.clone(),
            tools: self
                .tools
                .as_ref()
                .map(|tools| Arc::clone(tools) as Arc<dyn ToolLister>),
        }
    }

    /// Drop history and flags. The system prompt and registry stay.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.pending_tool_calls.clear();
        self.is_streaming = false;
        self.last_error = None;
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(SessionStatus {
            message_count: self.messages.len(),
            pending_tool_calls: self.pending_tool_calls(),
            is_streaming: self.is_streaming,
            last_error: self.last_error.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin;
    use pretty_assertions::assert_eq;

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let mut state = ConversationState::new("sys", None);
        state.push(Message::user("one"));

        let snapshot = state.snapshot();
        state.push(Message::user("two"));

        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(state.messages().len(), 2);
        assert!(snapshot.tool_names().is_empty());
    }

    #[test]
    fn snapshot_shares_tool_lister() {
        let registry = ToolRegistry::new().with_tool(builtin::calculator_tool());
        let state = ConversationState::new("", Some(Arc::new(registry)));
        assert_eq!(state.snapshot().tool_names(), vec!["calculator"]);
    }

    #[test]
    fn status_follows_mutations() {
        let mut state = ConversationState::new("", None);
        let status = state.subscribe();

        state.push(Message::user("hi"));
        state.mark_pending("call_1");
        state.set_streaming(true);
        state.set_error("boom");

        assert_eq!(
            *status.borrow(),
            SessionStatus {
                message_count: 1,
                pending_tool_calls: vec!["call_1".into()],
                is_streaming: true,
                last_error: Some("boom".into()),
            }
        );

        state.clear_pending("call_1");
        state.reset();
        assert_eq!(*status.borrow(), SessionStatus::default());
    }

    #[test]
    fn reset_keeps_system_prompt_and_tools() {
        let registry = Arc::new(ToolRegistry::new());
        let mut state = ConversationState::new("persona", Some(registry));
        state.push(Message::user("x"));

        state.reset();

        assert_eq!(state.system_prompt(), "persona");
        assert!(state.tools().is_some());
        assert!(state.messages().is_empty());
    }
}

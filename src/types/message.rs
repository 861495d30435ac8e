//! Conversation messages and content blocks.
//!
//! [`Message`] is the full history an agent keeps; [`LlmMessage`] is the subset a
//! completion backend is allowed to see. The conversion between the two is an
//! exhaustive match, so a new message kind has to decide its visibility.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::usage::Usage;

/// A single block of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image(ImageContent),
    Thinking { thinking: String },
    ToolCall(ToolCall),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Image content embedded in a message (base64 payload).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageContent {
    pub data: String,
    pub mime_type: String,
}

impl ImageContent {
    /// Encode raw image bytes.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// `data:` URL form used by OpenAI-style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A tool call requested by the model or by a plan step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Why the assistant stopped producing output.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    #[default]
    Stop,
    Length,
    ToolUse,
    Error,
    Aborted,
}

/// Message role tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    Control,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserMessage {
    pub content: Vec<ContentBlock>,
    pub timestamp: DateTime<Utc>,
}

impl UserMessage {
    pub fn new(content: Vec<ContentBlock>) -> Self {
        Self {
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentBlock::text(text)])
    }
}

impl From<&str> for UserMessage {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for UserMessage {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

/// A model response, possibly carrying tool-call blocks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub stop_reason: StopReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AssistantMessage {
    pub fn new(content: Vec<ContentBlock>, stop_reason: StopReason) -> Self {
        Self {
            content,
            provider: String::new(),
            model: "unknown".to_string(),
            usage: None,
            stop_reason,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    /// Plain text answer with stop reason `stop`.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentBlock::text(text)], StopReason::Stop)
    }

    /// One tool-call block per call, stop reason `tool_use`.
    pub fn tool_use(calls: &[ToolCall]) -> Self {
        Self::new(
            calls.iter().cloned().map(ContentBlock::ToolCall).collect(),
            StopReason::ToolUse,
        )
    }

    /// Record which backend and model produced this message. Empty model names stay `unknown`.
    pub fn with_origin(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        let model = model.into();
        if !model.is_empty() {
            self.model = model;
        }
        self
    }

    /// Concatenated text blocks.
    pub fn text_content(&self) -> String {
        collect_text(&self.content)
    }

    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

/// A standalone tool-call record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallMessage {
    pub tool_call: ToolCall,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallMessage {
    pub fn new(tool_call: ToolCall) -> Self {
        Self {
            tool_call,
            timestamp: Utc::now(),
        }
    }
}

/// Marker text for calls dropped because a steering message arrived.
pub const SKIPPED_BY_STEERING: &str = "skipped (steering interrupt)";

/// The outcome of one tool invocation, rendered for the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultMessage {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolResultMessage {
    /// Successful result: text is the compact JSON of `value`, details keep the value itself.
    pub fn success(call: &ToolCall, value: serde_json::Value) -> Self {
        let text = serde_json::to_string(&value).unwrap_or_else(|_| value.to_string());
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: vec![ContentBlock::text(text)],
            details: Some(value),
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: vec![ContentBlock::text(message)],
            details: None,
            is_error: true,
            timestamp: Utc::now(),
        }
    }

    pub fn skipped(call: &ToolCall) -> Self {
        Self::error(call, SKIPPED_BY_STEERING)
    }

    pub fn text_content(&self) -> String {
        collect_text(&self.content)
    }

    /// The error text, if this result is an error.
    pub fn error_text(&self) -> Option<String> {
        self.is_error.then(|| self.text_content())
    }

    /// Structured payload for events: details when present, otherwise the text.
    pub fn payload(&self) -> serde_json::Value {
        match &self.details {
            Some(value) => value.clone(),
            None => serde_json::Value::String(self.text_content()),
        }
    }
}

/// Orchestrator-authored bookkeeping text (e.g. "tool calls completed").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlMessage {
    pub content: Vec<ContentBlock>,
    pub timestamp: DateTime<Utc>,
}

impl ControlMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            timestamp: Utc::now(),
        }
    }
}

/// Application-defined message kept in history but never sent to a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomMessage {
    pub kind: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A message in an agent's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolCall(ToolCallMessage),
    ToolResult(ToolResultMessage),
    Control(ControlMessage),
    Custom(CustomMessage),
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserMessage::text(text))
    }

    pub fn custom(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self::Custom(CustomMessage {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        })
    }

    pub fn role(&self) -> Role {
        match self {
            Self::User(_) => Role::User,
            Self::Assistant(_) => Role::Assistant,
            Self::ToolCall(_) => Role::ToolCall,
            Self::ToolResult(_) => Role::ToolResult,
            Self::Control(_) => Role::Control,
            Self::Custom(_) => Role::Custom,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::User(m) => m.timestamp,
            Self::Assistant(m) => m.timestamp,
            Self::ToolCall(m) => m.timestamp,
            Self::ToolResult(m) => m.timestamp,
            Self::Control(m) => m.timestamp,
            Self::Custom(m) => m.timestamp,
        }
    }

    /// Concatenated text content; empty for tool calls and custom messages.
    pub fn text(&self) -> String {
        match self {
            Self::User(m) => collect_text(&m.content),
            Self::Assistant(m) => m.text_content(),
            Self::ToolResult(m) => m.text_content(),
            Self::Control(m) => collect_text(&m.content),
            Self::ToolCall(_) | Self::Custom(_) => String::new(),
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(m) => Some(m),
            _ => None,
        }
    }

    /// The LLM-visible form of this message, if it has one.
    pub fn to_llm(&self) -> Option<LlmMessage> {
        match self {
            Self::User(m) => Some(LlmMessage::User(m.clone())),
            Self::Assistant(m) => Some(LlmMessage::Assistant(m.clone())),
            Self::ToolCall(m) => Some(LlmMessage::ToolCall(m.clone())),
            Self::ToolResult(m) => Some(LlmMessage::ToolResult(m.clone())),
            Self::Control(_) | Self::Custom(_) => None,
        }
    }
}

impl From<UserMessage> for Message {
    fn from(m: UserMessage) -> Self {
        Self::User(m)
    }
}

impl From<AssistantMessage> for Message {
    fn from(m: AssistantMessage) -> Self {
        Self::Assistant(m)
    }
}

impl From<ToolResultMessage> for Message {
    fn from(m: ToolResultMessage) -> Self {
        Self::ToolResult(m)
    }
}

impl From<ControlMessage> for Message {
    fn from(m: ControlMessage) -> Self {
        Self::Control(m)
    }
}

/// The four message roles a completion backend understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum LlmMessage {
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolCall(ToolCallMessage),
    ToolResult(ToolResultMessage),
}

impl LlmMessage {
    pub fn role(&self) -> Role {
        match self {
            Self::User(_) => Role::User,
            Self::Assistant(_) => Role::Assistant,
            Self::ToolCall(_) => Role::ToolCall,
            Self::ToolResult(_) => Role::ToolResult,
        }
    }
}

/// Default conversion: keep user, assistant, tool-call and tool-result messages.
pub fn convert_to_llm(messages: &[Message]) -> Vec<LlmMessage> {
    messages.iter().filter_map(Message::to_llm).collect()
}

/// Text of the most recent assistant message, if any.
pub fn last_assistant_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find_map(Message::as_assistant)
        .map(AssistantMessage::text_content)
}

/// Tool-result ids that do not answer exactly one earlier tool-call block.
pub fn orphan_tool_results(messages: &[Message]) -> Vec<String> {
    let mut issued: HashSet<&str> = HashSet::new();
    let mut answered: HashSet<&str> = HashSet::new();
    let mut orphans = Vec::new();
    for message in messages {
        match message {
            Message::Assistant(m) => {
                issued.extend(m.tool_calls().into_iter().map(|c| c.id.as_str()));
            }
            Message::ToolCall(m) => {
                issued.insert(m.tool_call.id.as_str());
            }
            Message::ToolResult(m) => {
                let id = m.tool_call_id.as_str();
                if !issued.contains(id) || !answered.insert(id) {
                    orphans.push(m.tool_call_id.clone());
                }
            }
            Message::User(_) | Message::Control(_) | Message::Custom(_) => {}
        }
    }
    orphans
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

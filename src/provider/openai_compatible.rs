//! Backend for OpenAI-compatible chat completion APIs (OpenRouter by default).

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::http::{bearer_headers, parse_sse_data, shared_client, status_to_error, SseData};
use super::{BackendStreamEvent, CompletionBackend, CompletionRequest, CompletionResponse, DEFAULT_BASE_URL};
use crate::error::ConductorError;
use crate::types::{ContentBlock, LlmMessage, ToolCall, Usage};

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleBackend {
    model: String,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompatibleBackend {
    pub fn new(model: impl Into<String>, api_key: Option<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            model: model.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system_prompt }));
        }
        messages.extend(request.messages.iter().map(message_to_openai));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": stream,
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            if let Some(obj) = body.as_object_mut() {
                obj.insert("tools".into(), Value::Array(tools));
                obj.insert("parallel_tool_calls".into(), Value::Bool(true));
            }
        }

        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, ConductorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = shared_client()
            .post(&url)
            .headers(bearer_headers(self.api_key.as_deref()))
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ConductorError> {
        let body = self.build_request_body(request, false);
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "chat completion"
        );

        let data: ChatResponse = self.post(&body).await?.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ConductorError::api(200, "no choices in completion response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, parse_arguments(&tc.function.arguments)))
            .collect();

        Ok(CompletionResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            model: data.model.unwrap_or_default(),
            usage: data.usage.map(Usage::from).unwrap_or_default(),
        })
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<BackendStreamEvent, ConductorError>>, ConductorError> {
        let body = self.build_request_body(request, true);
        debug!(model = %self.model, "chat completion stream");

        let byte_stream = self.post(&body).await?.bytes_stream();
        let model = self.model.clone();

        let stream = async_stream::stream! {
            yield Ok(BackendStreamEvent::Start { model });

            let mut buffer: Vec<u8> = Vec::new();
            let mut pending: BTreeMap<usize, PartialToolCall> = BTreeMap::new();
            let mut usage = None;
            futures::pin_mut!(byte_stream);

            'read: while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(ConductorError::Network(e));
                        return;
                    }
                };
                buffer.extend_from_slice(&chunk);

                while let Some(line) = take_line(&mut buffer) {

                    let data = match parse_sse_data(&line) {
                        Some(SseData::Json(data)) => data,
                        Some(SseData::Done) => break 'read,
                        None => continue,
                    };
                    let chunk: StreamChunk = match serde_json::from_str(data) {
                        Ok(c) => c,
                        Err(e) => {
                            debug!(error = %e, "skipping unparseable stream chunk");
                            continue;
                        }
                    };
                    if let Some(u) = chunk.usage {
                        usage = Some(Usage::from(u));
                    }
                    let Some(choice) = chunk.choices.into_iter().next() else {
                        continue;
                    };
                    if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                        yield Ok(BackendStreamEvent::TextDelta(text));
                    }
                    for delta in choice.delta.tool_calls.unwrap_or_default() {
                        let entry = pending.entry(delta.index).or_default();
                        let (name, arguments) = match delta.function {
                            Some(f) => (f.name, f.arguments.unwrap_or_default()),
                            None => (None, String::new()),
                        };
                        if let Some(id) = &delta.id {
                            entry.id = id.clone();
                        }
                        if let Some(name) = &name {
                            entry.name.push_str(name);
                        }
                        entry.arguments.push_str(&arguments);
                        yield Ok(BackendStreamEvent::ToolCallDelta {
                            index: delta.index,
                            id: delta.id,
                            name,
                            arguments,
                        });
                    }
                }
            }

            for (_, call) in std::mem::take(&mut pending) {
                yield Ok(BackendStreamEvent::ToolCall(call.finish()));
            }
            yield Ok(BackendStreamEvent::Done { usage });
        };

        Ok(Box::pin(stream))
    }
}

/// Pop one complete line off `buffer`.
///
/// Bytes are decoded per line since a network chunk may end inside a multi-byte character.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|&b| b == b'\n')?;
    let raw: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&raw).trim().to_string())
}

/// Decode a JSON-string argument payload; anything unparseable becomes `{}`.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| json!({}))
}

fn message_to_openai(message: &LlmMessage) -> Value {
    match message {
        LlmMessage::User(m) => {
            let has_image = m.content.iter().any(|b| matches!(b, ContentBlock::Image(_)));
            if !has_image {
                return json!({ "role": "user", "content": text_of(&m.content) });
            }
            let parts: Vec<Value> = m
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(json!({ "type": "text", "text": text })),
                    ContentBlock::Image(img) => Some(json!({
                        "type": "image_url",
                        "image_url": { "url": img.data_url() }
                    })),
                    ContentBlock::Thinking { .. } | ContentBlock::ToolCall(_) => None,
                })
                .collect();
            json!({ "role": "user", "content": parts })
        }
        LlmMessage::Assistant(m) => {
            let text = m.text_content();
            let calls: Vec<Value> = m.tool_calls().into_iter().map(tool_call_to_openai).collect();
            let mut out = json!({
                "role": "assistant",
                "content": if text.is_empty() { Value::Null } else { Value::String(text) },
            });
            if !calls.is_empty() {
                if let Some(obj) = out.as_object_mut() {
                    obj.insert("tool_calls".into(), Value::Array(calls));
                }
            }
            out
        }
        LlmMessage::ToolCall(m) => json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": [tool_call_to_openai(&m.tool_call)],
        }),
        LlmMessage::ToolResult(m) => json!({
            "role": "tool",
            "tool_call_id": m.tool_call_id,
            "content": m.text_content(),
        }),
    }
}

fn tool_call_to_openai(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": call.arguments.to_string(),
        }
    })
}

fn text_of(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn finish(self) -> ToolCall {
        ToolCall::new(self.id, self.name, parse_arguments(&self.arguments))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

//! Shared test helpers: a scripted backend and test tools.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::json;

use conductor::error::ConductorError;
use conductor::provider::{BackendStreamEvent, CompletionBackend, CompletionRequest, CompletionResponse};
use conductor::tools::{AgentTool, AgentToolParameters, Tool};
use conductor::types::{ToolCall, Usage};

/// Backend that replays queued responses in order.
///
/// Once the queue is empty it answers "Mock response".
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<CompletionResponse, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn queue_text(&self, text: &str) -> &Self {
        self.queue(Ok(CompletionResponse {
            text: text.to_string(),
            model: "scripted-1".to_string(),
            usage: usage(10, 20),
            ..Default::default()
        }))
    }

    pub fn queue_tool_calls(&self, calls: Vec<ToolCall>) -> &Self {
        self.queue(Ok(CompletionResponse {
            tool_calls: calls,
            model: "scripted-1".to_string(),
            usage: usage(10, 5),
            ..Default::default()
        }))
    }

    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) -> &Self {
        self.queue_tool_calls(vec![ToolCall::new(id, name, args)])
    }

    pub fn queue_error(&self, message: &str) -> &Self {
        self.queue(Err(message.to_string()))
    }

    fn queue(&self, response: Result<CompletionResponse, String>) -> &Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, ConductorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ConductorError::api(500, message)),
            None => Ok(CompletionResponse {
                text: "Mock response".to_string(),
                ..Default::default()
            }),
        }
    }

    async fn stream(
        &self,
        _request: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<BackendStreamEvent, ConductorError>>, ConductorError> {
        Err(ConductorError::InvalidState("scripted backend does not stream".into()))
    }
}

pub fn usage(input: u32, output: u32) -> Usage {
    Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: input + output,
    }
}

/// Records the order in which delayed tools finish.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Tool that sleeps for `delay`, logs its name and echoes its arguments.
pub fn delayed_tool(name: &str, delay: Duration, log: &CallLog) -> Arc<dyn Tool> {
    let log = log.clone();
    let tool_name = name.to_string();
    Arc::new(AgentTool::new(
        name,
        format!("delayed {name}"),
        AgentToolParameters::empty(),
        move |args, _ctx| {
            let log = log.clone();
            let tool_name = tool_name.clone();
            async move {
                tokio::time::sleep(delay).await;
                log.0.lock().unwrap().push(tool_name.clone());
                Ok(json!({"tool": tool_name, "args": args.raw().clone()}))
            }
        },
    ))
}

/// Tool that waits until its call is canceled.
pub fn blocking_tool(name: &str) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        name,
        "blocks until canceled",
        AgentToolParameters::empty(),
        |_args, ctx| async move {
            ctx.cancel.cancelled().await;
            Err(ConductorError::Canceled)
        },
    ))
}

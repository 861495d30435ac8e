//! HTTP front end: one prompt per request, answered as SSE or a single JSON body.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::agent_loop::AgentEvent;
use crate::config::ConductorConfig;
use crate::error::Result;
use crate::provider::CompletionBackend;
use crate::tools::{registry_from_config, ToolConfig};
use crate::types::Message;

/// Body of `POST /agent/prompt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Replaces the configured tools for this request only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolConfig>>,
}

/// Non-streaming reply.
#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub events: Vec<AgentEvent>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConductorConfig>,
    /// `None` runs sessions without a model; they answer with empty text.
    pub backend: Option<Arc<dyn CompletionBackend>>,
}

impl AppState {
    pub fn new(config: ConductorConfig, backend: Option<Arc<dyn CompletionBackend>>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    fn agent_for(&self, request: &PromptRequest) -> std::result::Result<Agent, ApiError> {
        let pool = match &request.tools {
            Some(configs) => registry_from_config(configs),
            None => self.config.tool_pool(),
        }
        .map_err(|e| ApiError::BadRequest(format!("invalid tool config: {e}")))?;

        let mut config = self.config.agent_config(self.backend.clone(), pool, false);
        if let Some(prompt) = request.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            config.system_prompt = prompt.to_string();
        }
        Ok(Agent::new(config))
    }
}

/// Request-level failures, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/agent/prompt", post(prompt))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(config: ConductorConfig, addr: SocketAddr) -> Result<()> {
    let backend = if config.has_api_key() {
        Some(config.backend())
    } else {
        warn!("no API key set; sessions will run without a model");
        None
    };
    let app = router(AppState::new(config, backend));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("conductor listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "agent": "ready" }))
}

async fn prompt(
    State(state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let request: PromptRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))?;
    if request.message.is_empty() {
        return Err(ApiError::BadRequest("message is required".to_string()));
    }

    let agent = state.agent_for(&request)?;
    let events = agent.prompt(request.message);

    if request.stream {
        return Ok(Sse::new(sse_frames(events))
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    let (events, result) = events.collect().await;
    let (messages, error) = match result {
        Ok(messages) => (messages, None),
        Err(err) => (agent.messages().await, Some(err.to_string())),
    };
    Ok(Json(PromptResponse {
        events,
        messages,
        error,
    })
    .into_response())
}

fn sse_frames<S>(events: S) -> impl Stream<Item = std::result::Result<Event, Infallible>>
where
    S: Stream<Item = AgentEvent> + Send + 'static,
{
    events
        .filter_map(|event| async move {
            match serde_json::to_string(&event) {
                Ok(data) => Some(Ok(Event::default().data(data))),
                Err(e) => {
                    warn!(kind = event.kind(), error = %e, "dropping unserializable event");
                    None
                }
            }
        })
        .chain(stream::once(async {
            Ok(Event::default().data(r#"{"type":"done"}"#))
        }))
}

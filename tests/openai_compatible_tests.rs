//! Wire-level tests for the OpenAI-compatible backend.

#![cfg(feature = "openai-compatible")]

use conductor::error::ConductorError;
use conductor::provider::{BackendStreamEvent, CompletionBackend, CompletionRequest, OpenAiCompatibleBackend};
use conductor::types::{convert_to_llm, Message, ToolCall};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> OpenAiCompatibleBackend {
    OpenAiCompatibleBackend::new("test/model", Some("sk-test".into()), Some(server.uri()))
}

fn request(text: &str) -> CompletionRequest {
    CompletionRequest::builder()
        .system_prompt("Be brief.")
        .messages(convert_to_llm(&[Message::user(text)]))
        .temperature(0.7)
        .max_tokens(100)
        .build()
}

#[tokio::test]
async fn complete_parses_text_tool_calls_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test/model",
            "stream": false,
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "what is 2+2?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "test/model-2025",
            "choices": [{
                "message": {
                    "content": "Let me compute.",
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "calculator", "arguments": "{\"expression\":\"2+2\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7, "total_tokens": 19}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server).complete(&request("what is 2+2?")).await.unwrap();

    assert_eq!(response.text, "Let me compute.");
    assert_eq!(response.model, "test/model-2025");
    assert_eq!(
        response.tool_calls,
        vec![ToolCall::new("call_abc", "calculator", json!({"expression": "2+2"}))]
    );
    assert_eq!(response.usage.input_tokens, 12);
    assert_eq!(response.usage.output_tokens, 7);
}

#[tokio::test]
async fn status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": {"retry_after": 1.5}})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;
    let backend = backend(&server);

    let auth = backend.complete(&request("hi")).await.unwrap_err();
    let limited = backend.complete(&request("hi")).await.unwrap_err();
    let upstream = backend.complete(&request("hi")).await.unwrap_err();

    assert!(matches!(auth, ConductorError::Authentication(_)));
    assert!(matches!(
        limited,
        ConductorError::RateLimited {
            retry_after_ms: Some(1500)
        }
    ));
    assert!(matches!(upstream, ConductorError::Api { status: 502, .. }));
    assert!(limited.is_retryable());
}

#[tokio::test]
async fn stream_emits_deltas_then_assembled_tool_calls() {
    let server = MockServer::start().await;
    let body = [
        r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
        r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
        r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"calculator","arguments":"{\"expre"}}]}}]}"#,
        r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ssion\":\"1+1\"}"}}]}}]}"#,
        r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
        "data: [DONE]",
        "",
    ]
    .join("\n\n");
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let events: Vec<BackendStreamEvent> = backend(&server)
        .stream(&request("hi"))
        .await
        .unwrap()
        .map(|event| event.unwrap())
        .collect()
        .await;

    assert_eq!(
        events.first(),
        Some(&BackendStreamEvent::Start {
            model: "test/model".into()
        })
    );
    let text: String = events
        .iter()
        .filter_map(|event| match event {
            BackendStreamEvent::TextDelta(text) => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Hello");
    let deltas = events
        .iter()
        .filter(|event| matches!(event, BackendStreamEvent::ToolCallDelta { .. }))
        .count();
    assert_eq!(deltas, 2);
    let n = events.len();
    assert_eq!(
        events[n - 2],
        BackendStreamEvent::ToolCall(ToolCall::new("call_1", "calculator", json!({"expression": "1+1"})))
    );
    let BackendStreamEvent::Done { usage: Some(usage) } = &events[n - 1] else {
        panic!("expected done with usage, got {:?}", events[n - 1]);
    };
    assert_eq!(usage.total_tokens, 7);
}

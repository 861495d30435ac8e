//! HTTP front end tests against a live listener.

#![cfg(feature = "server")]

mod common;

use std::sync::Arc;

use conductor::config::ConductorConfig;
use conductor::provider::CompletionBackend;
use conductor::server::{router, AppState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use common::ScriptedBackend;

async fn spawn(backend: Option<Arc<dyn CompletionBackend>>) -> String {
    let app = router(AppState::new(ConductorConfig::default(), backend));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn health_reports_ready() {
    let base = spawn(None).await;

    let body: Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();

    assert_eq!(body, json!({"status": "ok", "agent": "ready"}));
}

#[tokio::test]
async fn non_streaming_prompt_returns_events_and_messages() {
    let backend = ScriptedBackend::shared();
    backend
        .queue_tool_call("c1", "calculator", json!({"expression": "2+2"}))
        .queue_text("It is 4");
    let base = spawn(Some(backend.clone())).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/agent/prompt"))
        .json(&json!({"message": "2+2?", "system_prompt": "You add."}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let kinds: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.first(), Some(&"turn_start"));
    assert_eq!(kinds.last(), Some(&"turn_end"));
    assert!(kinds.contains(&"tool_call"));
    assert_eq!(body["messages"].as_array().unwrap().len(), 5);
    assert!(body.get("error").is_none());
    assert!(backend.requests()[0].system_prompt.starts_with("You add."));
}

#[tokio::test]
async fn streaming_prompt_ends_with_done_frame() {
    let backend = ScriptedBackend::shared();
    backend.queue_text("Hi there");
    let base = spawn(Some(backend)).await;

    let text = reqwest::Client::new()
        .post(format!("{base}/agent/prompt"))
        .json(&json!({"message": "hello", "stream": true}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let frames: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();
    assert_eq!(frames.first().unwrap()["type"], "turn_start");
    assert_eq!(frames.last().unwrap(), &json!({"type": "done"}));
    assert!(frames
        .iter()
        .any(|frame| frame["type"] == "text_delta" && frame["payload"]["text"] == "Hi "));
}

#[tokio::test]
async fn request_tools_replace_defaults() {
    let backend = ScriptedBackend::shared();
    backend.queue_text("no tools needed");
    let base = spawn(Some(backend.clone())).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/agent/prompt"))
        .json(&json!({
            "message": "hi",
            "tools": [{"type": "http", "name": "geo", "endpoint": "http://127.0.0.1:9/geo"}]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let offered: Vec<String> = backend.requests()[0].tools.iter().map(|t| t.name.clone()).collect();
    assert_eq!(offered, vec!["geo"]);
}

#[tokio::test]
async fn bad_requests_are_rejected() {
    let base = spawn(None).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/agent/prompt");

    let malformed = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    let missing = client.post(&url).json(&json!({"stream": false})).send().await.unwrap();
    let bad_tool = client
        .post(&url)
        .json(&json!({"message": "hi", "tools": [{"type": "mcp", "name": "files"}]}))
        .send()
        .await
        .unwrap();
    let wrong_method = client.get(&url).send().await.unwrap();

    assert_eq!(malformed.status(), 400);
    assert_eq!(missing.status(), 400);
    assert_eq!(bad_tool.status(), 400);
    let body: Value = bad_tool.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("invalid tool config"));
    assert_eq!(wrong_method.status(), 405);
}

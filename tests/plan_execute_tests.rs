//! End-to-end turns through the plan-and-execute strategy.

mod common;

use std::sync::Arc;

use conductor::agent::{Agent, AgentConfig};
use conductor::agent_loop::{AgentEvent, OrchestratorKind, PlannedCall};
use conductor::error::ConductorError;
use conductor::tools::{builtin, ToolRegistry};
use conductor::types::{Message, Role};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{blocking_tool, ScriptedBackend};

fn planner(backend: Arc<ScriptedBackend>) -> Agent {
    let tools = ToolRegistry::new()
        .with_tool(builtin::calculator_tool())
        .with_tool(builtin::current_time_tool());
    Agent::new(
        AgentConfig::new(backend)
            .with_tools(Arc::new(tools))
            .with_orchestrator(OrchestratorKind::PlanExecute.build()),
    )
}

fn count(events: &[AgentEvent], kind: &str) -> usize {
    events.iter().filter(|event| event.kind() == kind).count()
}

#[tokio::test]
async fn empty_plan_goes_straight_to_synthesis() {
    let backend = ScriptedBackend::shared();
    backend.queue_text(r#"{"steps":[]}"#).queue_text("Nothing to do.");
    let agent = planner(backend.clone());

    let (events, result) = agent.prompt("hi").collect().await;

    assert_eq!(count(&events, "tool_call"), 0);
    assert_eq!(backend.call_count(), 2);
    assert!(events.contains(&AgentEvent::PlanCreated {
        step_count: 0,
        steps: vec![],
    }));
    let history = result.unwrap();
    assert_eq!(history.last().unwrap().text(), "Nothing to do.");
}

#[tokio::test]
async fn fenced_plan_runs_its_step() {
    let backend = ScriptedBackend::shared();
    backend
        .queue_text(
            "Plan:\n```json\n{\"steps\":[{\"tool\":\"calculator\",\"args\":{\"expression\":\"6*7\"}}]}\n```",
        )
        .queue_text("6 times 7 is 42.");
    let agent = planner(backend.clone());

    let (events, result) = agent.prompt("what is 6*7?").collect().await;

    let kinds: Vec<&str> = events.iter().map(AgentEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            "turn_start",
            "plan_created",
            "plan_step_start",
            "tool_call",
            "tool_result",
            "plan_step_end",
            "text_delta",
            "text_delta",
            "text_delta",
            "text_delta",
            "text_delta",
            "turn_end",
        ]
    );
    assert_eq!(
        events[1],
        AgentEvent::PlanCreated {
            step_count: 1,
            steps: vec![PlannedCall {
                tool: "calculator".into(),
                args: json!({"expression": "6*7"}),
            }],
        }
    );
    assert_eq!(
        events[5],
        AgentEvent::PlanStepEnd {
            index: 0,
            step_count: 1,
            tool: "calculator".into(),
            result: json!({"result": 42.0}),
            error: None,
        }
    );

    let history = result.unwrap();
    let roles: Vec<Role> = history.iter().map(Message::role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Assistant, Role::ToolResult, Role::Assistant]
    );
    let Message::ToolResult(step) = &history[3] else {
        panic!("expected tool result");
    };
    assert_eq!(step.tool_call_id, "plan-step-0");

    let requests = backend.requests();
    assert_eq!(requests[0].temperature, 0.3);
    assert_eq!(requests[0].max_tokens, 2000);
    assert!(requests[0].tools.is_empty());
    assert!(requests[0].system_prompt.contains("calculator: "));
    assert_eq!(requests[1].temperature, 0.5);
    assert_eq!(requests[1].max_tokens, 1000);
    assert_eq!(requests[1].messages.len(), 4);
}

#[tokio::test]
async fn unparseable_plan_still_synthesizes() {
    let backend = ScriptedBackend::shared();
    backend
        .queue_text("I would add the numbers together.")
        .queue_text("Here is my answer anyway.");
    let agent = planner(backend.clone());

    let (events, result) = agent.prompt("add 1 and 2").collect().await;

    assert_eq!(count(&events, "tool_call"), 0);
    assert_eq!(backend.call_count(), 2);
    assert_eq!(result.unwrap().last().unwrap().text(), "Here is my answer anyway.");
    assert!(agent.last_error().unwrap().starts_with("failed to parse plan"));
}

#[tokio::test]
async fn failing_step_is_recorded_and_turn_continues() {
    let backend = ScriptedBackend::shared();
    backend
        .queue_text(r#"{"steps":[{"tool":"calculator","args":{"expression":"1/0"}},{"tool":"get_current_time"}]}"#)
        .queue_text("Division failed, but here is the time.");
    let agent = planner(backend);

    let (events, result) = agent.prompt("divide and tell time").collect().await;

    let step_errors: Vec<Option<String>> = events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::PlanStepEnd { error, .. } => Some(error.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(step_errors.len(), 2);
    assert!(step_errors[0].as_deref().unwrap().contains("division by zero"));
    assert_eq!(step_errors[1], None);
    assert!(result.is_ok());
}

#[tokio::test]
async fn empty_synthesis_uses_fallback_text() {
    let backend = ScriptedBackend::shared();
    backend.queue_text(r#"{"steps":[]}"#).queue_text("");
    let agent = planner(backend);

    let history = agent.prompt("hi").result().await.unwrap();

    assert_eq!(history.last().unwrap().text(), "I've completed the steps.");
}

#[tokio::test]
async fn planning_failure_ends_the_stream() {
    let backend = ScriptedBackend::shared();
    backend.queue_error("model overloaded");
    let agent = planner(backend.clone());

    let (events, result) = agent.prompt("hi").collect().await;

    let err = result.unwrap_err();
    assert!(err.to_string().starts_with("plan-and-execute: planning call"));
    assert!(matches!(*err, ConductorError::Backend { .. }));
    assert_eq!(count(&events, "turn_end"), 0);
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn synthesis_failure_ends_the_stream() {
    let backend = ScriptedBackend::shared();
    backend.queue_text(r#"{"steps":[]}"#).queue_error("gone");
    let agent = planner(backend);

    let err = agent.prompt("hi").result().await.unwrap_err();

    assert!(err.to_string().starts_with("plan-and-execute: synthesis call"));
}

#[tokio::test]
async fn missing_backend_is_a_configuration_error() {
    let agent = Agent::new(AgentConfig::default().with_orchestrator(OrchestratorKind::PlanExecute.build()));

    let (events, result) = agent.prompt("hi").collect().await;

    assert_eq!(events.iter().map(AgentEvent::kind).collect::<Vec<_>>(), vec!["turn_start"]);
    let err = result.unwrap_err();
    assert!(matches!(*err, ConductorError::Configuration(_)));
    assert!(err.to_string().contains("no completion backend configured"));
}

#[tokio::test]
async fn cancel_during_a_step_stops_before_the_next_one() {
    let backend = ScriptedBackend::shared();
    backend
        .queue_text(r#"{"steps":[{"tool":"wait","args":{}},{"tool":"calculator","args":{"expression":"1+1"}}]}"#)
        .queue_text("should never be requested");
    let tools = ToolRegistry::new()
        .with_tool(blocking_tool("wait"))
        .with_tool(builtin::calculator_tool());
    let agent = Agent::new(
        AgentConfig::new(backend.clone())
            .with_tools(Arc::new(tools))
            .with_orchestrator(OrchestratorKind::PlanExecute.build()),
    );
    let token = CancellationToken::new();
    let mut status = agent.watch_status();

    let stream = agent.prompt_with_cancel("wait then add", token.clone());
    status
        .wait_for(|status| !status.pending_tool_calls.is_empty())
        .await
        .unwrap();
    token.cancel();
    let (events, result) = stream.collect().await;

    assert!(result.unwrap_err().is_canceled());
    let started: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::PlanStepStart { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![0]);
    assert_eq!(count(&events, "turn_end"), 0);
    assert_eq!(backend.call_count(), 1);
}

//! Reactive steering: the model picks tools one round at a time.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::events::AgentEvent;
use super::steering::SteeringDecision;
use super::turn::TurnContext;
use super::Orchestrator;
use crate::tools::delegate::DELEGATE_TOOL_NAME;
use crate::types::{AssistantMessage, ControlMessage, Message, ToolCall, ToolResultMessage, Usage};

const ROUND_COMPLETE: &str =
    "All requested tool calls have completed. What would you like to do next?";

/// Decide, run the requested tools concurrently, feed results back, repeat
/// until the model answers in text. Follow-up messages start another turn.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReactiveOrchestrator;

#[async_trait]
impl Orchestrator for ReactiveOrchestrator {
    fn name(&self) -> &str {
        "reactive"
    }

    async fn run(&self, turn: &mut TurnContext<'_>) {
        loop {
            let started = Instant::now();
            turn.emit(AgentEvent::TurnStart {
                timestamp: Utc::now().timestamp_millis(),
            })
            .await;

            if turn.is_canceled() {
                turn.abort();
                return;
            }
            let mut decision = decide_or_recover(turn, false).await;
            let mut usage = Usage::default();

            let text = loop {
                if let Some(spent) = decision.usage() {
                    usage.merge(spent);
                }
                turn.emit(AgentEvent::SteeringMode {
                    mode: decision.mode(),
                    queue_size: decision.queue_size(),
                })
                .await;

                let (calls, rationale) = match decision {
                    SteeringDecision::Respond { ref text, .. } => break text.clone(),
                    SteeringDecision::Steer {
                        ref calls,
                        ref rationale,
                        ..
                    } => (calls.clone(), rationale.clone()),
                };
                if turn.is_canceled() {
                    turn.abort();
                    return;
                }
                if let Some(text) = rationale {
                    turn.emit(AgentEvent::Thinking { text }).await;
                }

                let backend = turn.backend_name();
                turn.state
                    .push(AssistantMessage::tool_use(&calls).with_origin(backend, decision.model()));
                for call in &calls {
                    turn.state.mark_pending(call.id.clone());
                }

                let mut interrupt = turn.steering.drain();
                let results = if interrupt.is_empty() {
                    match turn.execute_round(&calls).await {
                        Some(results) => results,
                        None => {
                            turn.abort();
                            return;
                        }
                    }
                } else {
                    debug!(skipped = calls.len(), "steering interrupt before round");
                    calls.iter().map(ToolResultMessage::skipped).collect()
                };

                for call in &calls {
                    turn.emit(AgentEvent::tool_call(call)).await;
                }
                for result in results {
                    turn.emit(AgentEvent::tool_result(&result)).await;
                    turn.state.clear_pending(&result.tool_call_id);
                    turn.state.push(result);
                }

                if interrupt.is_empty() {
                    interrupt = turn.steering.drain();
                }
                if interrupt.is_empty() {
                    turn.state.push(round_summary(&calls));
                } else {
                    turn.state.extend(interrupt);
                }

                if turn.is_canceled() {
                    turn.abort();
                    return;
                }
                decision = decide_or_recover(turn, true).await;
            };

            let mut message = AssistantMessage::text(text)
                .with_origin(turn.backend_name(), decision.model());
            if usage != Usage::default() {
                message.usage = Some(usage);
            }
            turn.respond(message, started).await;

            let follow_ups = turn.follow_up.drain();
            if follow_ups.is_empty() {
                turn.finish();
                return;
            }
            debug!(count = follow_ups.len(), "starting follow-up turn");
            turn.state.extend(follow_ups);
        }
    }
}

/// A failed decision becomes an apology the turn can still deliver.
async fn decide_or_recover(turn: &mut TurnContext<'_>, follow_up: bool) -> SteeringDecision {
    match turn.decide(follow_up).await {
        Ok(decision) => decision,
        Err(err) => {
            turn.record_error(&err);
            SteeringDecision::respond(format!("I encountered an error: {err}"))
        }
    }
}

fn round_summary(calls: &[ToolCall]) -> Message {
    let mut lines: Vec<String> = calls
        .iter()
        .filter(|call| call.name == DELEGATE_TOOL_NAME)
        .map(|call| format!("Task delegated via tool_call_id {}.", call.id))
        .collect();
    lines.push(ROUND_COMPLETE.to_string());
    ControlMessage::text(lines.join(" ")).into()
}

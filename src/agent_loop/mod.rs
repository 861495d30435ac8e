//! Turn orchestration: events, steering decisions and the two strategies.

pub mod events;
pub mod execute;
pub mod plan_execute;
pub mod reactive;
pub mod steering;
pub mod turn;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use events::{AgentEvent, PlannedCall, SteeringMode};
pub use execute::{execute_round, execute_tool_call};
pub use plan_execute::{Plan, PlanExecuteOrchestrator, PlanStep};
pub use reactive::ReactiveOrchestrator;
pub use steering::{SteeringDecider, SteeringDecision};
pub use turn::{TurnContext, TurnSender};

/// A turn-loop strategy.
///
/// `run` is called with the user message already appended and must settle
/// `turn.events` exactly once, with the history or an error.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, turn: &mut TurnContext<'_>);
}

/// Built-in strategies, selectable by name.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum OrchestratorKind {
    #[default]
    Reactive,
    #[serde(alias = "planexecute")]
    #[strum(to_string = "plan-execute", serialize = "planexecute")]
    PlanExecute,
}

impl OrchestratorKind {
    pub fn build(self) -> Arc<dyn Orchestrator> {
        match self {
            Self::Reactive => Arc::new(ReactiveOrchestrator),
            Self::PlanExecute => Arc::new(PlanExecuteOrchestrator),
        }
    }
}

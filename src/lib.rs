//! conductor: conversational agent orchestration.
//!
//! A session ([`agent::Agent`]) owns a conversation and runs each prompt as a
//! turn on its own task. The turn is driven by an
//! [`Orchestrator`](agent_loop::Orchestrator): the reactive strategy asks the
//! model whether to answer or call tools, round after round; plan-execute
//! plans every tool call up front, runs the plan and then summarizes.
//! Progress comes back as an [`EventStream`](stream::EventStream) of
//! [`AgentEvent`](agent_loop::AgentEvent)s that settles with the history.
//!
//! # Quick Start
//!
//! ```no_run
//! use conductor::prelude::*;
//! use futures::StreamExt;
//!
//! # async fn example(backend: std::sync::Arc<dyn CompletionBackend>) -> conductor::error::Result<()> {
//! let tools = ToolRegistry::new().with_tool(conductor::tools::builtin::calculator_tool());
//! let agent = Agent::new(AgentConfig::new(backend).with_tools(std::sync::Arc::new(tools)));
//!
//! let mut stream = agent.prompt("What is 2+2?");
//! while let Some(event) = stream.next().await {
//!     if let AgentEvent::TextDelta { text, .. } = event {
//!         print!("{text}");
//!     }
//! }
//! let history = stream.result().await.map_err(|e| ConductorError::Stream(e.to_string()))?;
//! println!("\n{} messages", history.len());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod agent_loop;
pub mod config;
pub mod error;
pub mod prelude;
pub mod provider;
pub mod stream;
pub mod tools;
pub mod transform;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "server")]
pub mod server;

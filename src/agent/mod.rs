//! Agent sessions: configuration, conversation state and message queues.

pub mod queue;
pub mod session;
pub mod state;

pub use queue::MessageQueue;
pub use session::{Agent, AgentConfig};
pub use state::{ContextSnapshot, ConversationState, SessionStatus};

//! Tools the model can call, and the registry that dispatches them.

pub mod arguments;
pub mod builtin;
pub mod config;
pub mod delegate;
pub mod http;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use config::{registry_from_config, HttpAuthConfig, ToolConfig};
pub use delegate::{with_delegate, DelegateTool, DELEGATE_TOOL_NAME};
pub use http::HttpTool;
pub use registry::{ToolLister, ToolRegistry};
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::{AgentToolParameters, ParameterBuilder, ToolDefinition};

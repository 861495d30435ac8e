//! Error types for Conductor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary error type for all Conductor operations.
#[derive(Error, Debug)]
pub enum ConductorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Stream error: {0}")]
    Stream(String),

    /// A completion-backend call made by an orchestrator failed.
    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: Box<ConductorError>,
    },

    #[error("pipeline transform: {0}")]
    Transform(String),

    #[error("failed to parse plan: {0}")]
    PlanParse(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation canceled")]
    Canceled,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse classification used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Authentication,
    RateLimit,
    Network,
    Server,
    Api,
    Serialization,
    Backend,
    Transform,
    PlanParse,
    ToolExecution,
    Canceled,
    Unknown,
}

impl ConductorError {
    /// Create an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Wrap a failed completion call with the phase it happened in.
    pub fn backend(context: impl Into<String>, source: ConductorError) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Shorthand for a tool-level failure.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Text shown to the model when a tool fails: the bare message for tool-level errors.
    pub fn tool_message(&self) -> String {
        match self {
            Self::ToolExecution { message, .. } => message.clone(),
            Self::InvalidArgument(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) | Self::Io(_) | Self::Stream(_) => ErrorCategory::Network,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Backend { .. } => ErrorCategory::Backend,
            Self::Transform(_) => ErrorCategory::Transform,
            Self::PlanParse(_) => ErrorCategory::PlanParse,
            Self::ToolExecution { .. } | Self::InvalidArgument(_) => ErrorCategory::ToolExecution,
            Self::Canceled => ErrorCategory::Canceled,
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Backend wrappers inherit the answer from the call that failed.
    pub fn is_retryable(&self) -> bool {
        if let Self::Backend { source, .. } = self {
            return source.is_retryable();
        }
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server
        )
    }

    /// True when the error stems from cancellation, possibly wrapped.
    pub fn is_canceled(&self) -> bool {
        match self {
            Self::Canceled => true,
            Self::Backend { source, .. } => source.is_canceled(),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ConductorError>;

/// Error shared between every reader of a settled stream.
pub type SharedError = Arc<ConductorError>;

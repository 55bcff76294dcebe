//! Agent error types.

use gigwatch_channels::ChannelError;
use gigwatch_core::ConfigError;
use gigwatch_memory::StoreError;
use gigwatch_sandbox::SandboxError;
use std::io;
use thiserror::Error;

/// Errors that can occur during agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Inbound text was empty after trimming.
    #[error("Empty message")]
    EmptyMessage,

    /// Tool arguments were not a JSON object.
    #[error("Tool arguments parse error: {message}")]
    ToolArguments {
        /// Tool the arguments were meant for.
        tool: String,
        /// Parser error.
        message: String,
    },

    /// The model asked for a tool that is not registered.
    #[error("Tool \"{0}\" not found")]
    UnknownTool(String),

    /// A tool with this name is already registered.
    #[error("Tool \"{0}\" is already registered")]
    DuplicateTool(String),

    /// Tool execution error.
    #[error("Tool execution failed: {0}")]
    Tool(String),

    /// Model endpoint error.
    #[error("Model API error: {0}")]
    Provider(String),

    /// The turn ran out of iterations.
    #[error("Iteration limit reached after {iterations} completions")]
    BudgetExceeded {
        /// Completions requested before giving up.
        iterations: usize,
    },

    /// No model endpoint is configured.
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    /// Persistence error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Sandbox error.
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AgentError {
    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a tool execution error.
    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    /// Create a tool argument error.
    pub fn tool_arguments(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ToolArguments {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Errors the runtime feeds back to the model instead of ending the turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ToolArguments { .. } | Self::UnknownTool(_) | Self::Tool(_) | Self::Sandbox(_)
        )
    }
}

impl From<AgentError> for ChannelError {
    fn from(e: AgentError) -> Self {
        ChannelError::handler(e.to_string())
    }
}

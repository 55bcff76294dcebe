//! Agent runtime and chat orchestration for GigWatch.
//!
//! This crate provides:
//! - The [`Tool`] contract, the [`ToolRegistry`], and the built-in tools
//! - Model provider integrations
//! - Prompt budgeting and history compaction
//! - The tool-calling [`AgentRuntime`]
//! - [`ChatService`], which runs one persisted turn per inbound message

pub mod chat;
pub mod context;
pub mod error;
pub mod providers;
pub mod runtime;
pub mod tools;

pub use chat::ChatService;
pub use context::{CompactionOutcome, ContextManager, ContextSummarizer, PromptBuild};
pub use error::AgentError;
pub use providers::{Completion, ModelProvider, OpenAICompatibleProvider};
pub use runtime::{AgentRuntime, FailureKind, RuntimeConfig, TurnOutcome, TurnStatus};
pub use tools::{Tool, ToolRegistry};

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

//! Model provider integrations.
//!
//! - [`OpenAICompatibleProvider`] - any `/chat/completions` endpoint with bearer auth

pub mod openai;

use crate::Result;
use async_trait::async_trait;
use gigwatch_core::{ChatMessage, ToolCallRequest, ToolDefinition};
use serde::{Deserialize, Serialize};

pub use openai::OpenAICompatibleProvider;

/// One model completion: final text, requested tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text, if any.
    pub content: Option<String>,

    /// Tool invocations requested by the model.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Completion {
    /// A text-only completion.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A completion requesting tool calls.
    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    /// Trimmed text content, empty when absent.
    pub fn reply_text(&self) -> &str {
        self.content.as_deref().map(str::trim).unwrap_or_default()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The assistant message to append to the conversation.
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::assistant_with_tools(self.content.clone(), self.tool_calls.clone())
    }
}

/// Trait for model providers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the current model.
    fn model(&self) -> &str;

    /// Request one completion. With an empty `tools` slice no tool schemas
    /// are sent.
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<Completion>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigwatch_core::Role;

    #[test]
    fn test_reply_text_trims() {
        assert_eq!(Completion::text("  done \n").reply_text(), "done");
        assert_eq!(Completion::default().reply_text(), "");
    }

    #[test]
    fn test_to_message_keeps_tool_calls() {
        let completion = Completion::tool_calls(vec![ToolCallRequest {
            id: "call_1".into(),
            name: "bash_exec".into(),
            arguments: "{}".into(),
        }]);
        let message = completion.to_message();
        assert_eq!(message.role, Role::Assistant);
        assert!(message.content.is_none());
        assert_eq!(message.tool_calls.len(), 1);
    }
}

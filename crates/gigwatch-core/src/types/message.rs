//! Conversation messages and the chat-facing request/reply types.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Role of a stored or prompted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(Error::unknown_variant("role", other)),
        }
    }
}

/// Channel a user message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatSource {
    Telegram,
    Web,
    Tui,
    Feishu,
}

impl ChatSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Web => "web",
            Self::Tui => "tui",
            Self::Feishu => "feishu",
        }
    }
}

impl fmt::Display for ChatSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Self::Telegram),
            "web" => Ok(Self::Web),
            "tui" => Ok(Self::Tui),
            "feishu" => Ok(Self::Feishu),
            other => Err(Error::unknown_variant("chat source", other)),
        }
    }
}

/// Source tag stored on replies produced by the agent.
pub const AGENT_SOURCE: &str = "agent";

/// A message as persisted in the conversation log.
///
/// Ids are assigned by the store and strictly increase in insertion order.
/// Stored messages are never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,
    pub visible: bool,
    /// Free-form metadata; `Value::Null` when absent.
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended to the conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub source: String,
    pub external_chat_id: Option<String>,
    pub external_user_id: Option<String>,
    pub visible: bool,
    pub metadata: Value,
}

impl NewMessage {
    /// Create a visible message with no external ids or metadata.
    pub fn new(role: Role, content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            source: source.into(),
            external_chat_id: None,
            external_user_id: None,
            visible: true,
            metadata: Value::Null,
        }
    }

    /// Attach the channel correspondent ids.
    pub fn with_external_ids(mut self, chat_id: Option<String>, user_id: Option<String>) -> Self {
        self.external_chat_id = chat_id;
        self.external_user_id = user_id;
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark the message as hidden from prompts and history listings.
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Rolling long-term memory for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub scope: String,
    /// Id of the last message folded into `summary_text` (0 when empty).
    pub until_message_id: i64,
    pub summary_text: String,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    /// An empty summary for a scope that has never been compacted.
    pub fn empty(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            until_message_id: 0,
            summary_text: String::new(),
            updated_at: Utc::now(),
        }
    }
}

/// A user message handed to the chat service by a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub source: ChatSource,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl IncomingMessage {
    pub fn new(source: ChatSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
            external_chat_id: None,
            external_user_id: None,
            metadata: None,
        }
    }

    pub fn with_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.external_chat_id = Some(chat_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.external_user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// The visible outcome of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub user_message_id: i64,
    pub assistant_message_id: i64,
    pub run_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_through_str() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("moderator".parse::<Role>().is_err());
    }

    #[test]
    fn test_chat_source_serde() {
        let json = serde_json::to_string(&ChatSource::Feishu).unwrap();
        assert_eq!(json, "\"feishu\"");
        let source: ChatSource = serde_json::from_str("\"tui\"").unwrap();
        assert_eq!(source, ChatSource::Tui);
    }

    #[test]
    fn test_new_message_builder() {
        let msg = NewMessage::new(Role::User, "hi", "telegram")
            .with_external_ids(Some("c1".into()), None)
            .hidden();
        assert!(!msg.visible);
        assert_eq!(msg.external_chat_id.as_deref(), Some("c1"));
        assert!(msg.metadata.is_null());
    }
}

//! Core channel traits.

use crate::Result;
use async_trait::async_trait;
use gigwatch_core::{ChatReply, IncomingMessage};

/// An event delivered by a channel transport.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Provider event id used for redelivery detection.
    pub event_id: Option<String>,

    /// The normalized user message.
    pub message: IncomingMessage,
}

impl InboundEvent {
    pub fn new(message: IncomingMessage) -> Self {
        Self {
            event_id: None,
            message,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

/// Trait for handling inbound messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message and produce the reply to send back.
    async fn handle(&self, message: IncomingMessage) -> Result<ChatReply>;
}

/// Trait for pushing text replies to a channel session.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    /// Channel identifier, for logging.
    fn channel(&self) -> &str;

    /// Send `text` to the chat identified by `chat_id`.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<()>;
}

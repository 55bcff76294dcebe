//! Glue from channel events to the message handler and back.

use crate::dedup::EventDeduplicator;
use crate::traits::{InboundEvent, MessageHandler, OutboundSender};
use gigwatch_core::ChatReply;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Characters of inbound text included in log lines.
const LOG_PREVIEW_CHARS: usize = 120;

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Event id was seen recently.
    Duplicate,
    /// Event came from a chat outside the allowed one, or had no chat id.
    Filtered,
    /// Message text was blank.
    Ignored,
    /// Handler produced a reply; `delivered` reports the send result.
    Replied { reply: ChatReply, delivered: bool },
    /// Handler failed; nothing was sent.
    Failed(String),
}

/// Routes inbound events through dedup and filtering to a handler, and
/// sends the handler's reply back on the originating channel.
pub struct ChannelDispatcher {
    handler: Arc<dyn MessageHandler>,
    sender: Arc<dyn OutboundSender>,
    allowed_chat_id: Option<String>,
}

impl ChannelDispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>, sender: Arc<dyn OutboundSender>) -> Self {
        Self {
            handler,
            sender,
            allowed_chat_id: None,
        }
    }

    /// Only answer events from this chat.
    pub fn with_allowed_chat(mut self, chat_id: Option<String>) -> Self {
        self.allowed_chat_id = chat_id.filter(|c| !c.trim().is_empty());
        self
    }

    /// Process one event.
    ///
    /// The event id is remembered before any filtering so a redelivered
    /// event is dropped even if the first delivery was filtered out. Send
    /// failures are logged and reported in the outcome, never returned.
    pub async fn dispatch(&self, dedup: &mut EventDeduplicator, event: InboundEvent) -> DispatchOutcome {
        if let Some(event_id) = event.event_id.as_deref() {
            if !dedup.observe(event_id) {
                debug!(channel = self.sender.channel(), event_id, "Dropping duplicate event");
                return DispatchOutcome::Duplicate;
            }
        }

        let message = event.message;
        let Some(chat_id) = message.external_chat_id.clone() else {
            return DispatchOutcome::Filtered;
        };
        if let Some(allowed) = &self.allowed_chat_id {
            if allowed != &chat_id {
                debug!(channel = self.sender.channel(), chat_id = %chat_id, "Ignoring message from unlisted chat");
                return DispatchOutcome::Filtered;
            }
        }
        if message.text.trim().is_empty() {
            return DispatchOutcome::Ignored;
        }

        info!(
            channel = self.sender.channel(),
            chat_id = %chat_id,
            text = %preview(&message.text),
            "Inbound message"
        );

        let reply = match self.handler.handle(message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(channel = self.sender.channel(), error = %e, "Failed to handle message");
                return DispatchOutcome::Failed(e.to_string());
            }
        };

        let delivered = match self.sender.send_text(&chat_id, &reply.text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = self.sender.channel(), chat_id = %chat_id, error = %e, "Failed to deliver reply");
                false
            }
        };

        DispatchOutcome::Replied { reply, delivered }
    }

    /// Drain a poller's event stream until it closes.
    ///
    /// The poller's dedup cache moves in here, so each stream keeps its own.
    pub async fn run(&self, mut events: mpsc::Receiver<InboundEvent>, mut dedup: EventDeduplicator) {
        while let Some(event) = events.recv().await {
            self.dispatch(&mut dedup, event).await;
        }
        debug!(channel = self.sender.channel(), "Event stream closed");
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

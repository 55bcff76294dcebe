//! Channel error types.

use thiserror::Error;

/// Errors that can occur during channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The message handler failed.
    #[error("Handler error: {0}")]
    Handler(String),

    /// Delivering a reply failed.
    #[error("Send failed on {channel}: {message}")]
    Send { channel: String, message: String },
}

impl ChannelError {
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    pub fn send(channel: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Send {
            channel: channel.into(),
            message: msg.into(),
        }
    }
}

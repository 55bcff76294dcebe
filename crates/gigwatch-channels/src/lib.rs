//! Inbound channel plumbing for GigWatch.
//!
//! Channel transports (long-polling, websockets) live elsewhere; this crate
//! provides what every poller shares: a bounded dedup cache for redelivered
//! events, the handler/sender traits, and the dispatcher that connects them.

pub mod dedup;
pub mod dispatch;
pub mod error;
pub mod traits;

pub use dedup::EventDeduplicator;
pub use dispatch::{ChannelDispatcher, DispatchOutcome};
pub use error::ChannelError;
pub use traits::{InboundEvent, MessageHandler, OutboundSender};

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

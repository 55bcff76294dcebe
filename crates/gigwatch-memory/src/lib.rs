//! Conversation storage for GigWatch.
//!
//! This crate provides:
//! - The [`ConversationStore`] trait: message log, agent runs and steps,
//!   and rolling conversation summaries
//! - A SQLite implementation backed by a single-writer sqlx pool
//! - An in-memory implementation for tests and ephemeral sessions

pub mod error;
pub mod memory;
mod schema;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use memory::InMemoryConversationStore;
pub use sqlite::SqliteConversationStore;
pub use store::ConversationStore;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

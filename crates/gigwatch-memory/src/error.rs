//! Store error types.

use gigwatch_core::RunStatus;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database driver error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// Run id does not exist.
    #[error("Agent run not found: {0}")]
    RunNotFound(i64),

    /// The run already made its terminal transition.
    #[error("Agent run {run_id} already finished with status {status}")]
    RunAlreadyFinished { run_id: i64, status: RunStatus },

    /// Runs can only be finished into a terminal status.
    #[error("Cannot finish a run with non-terminal status {0}")]
    NonTerminalStatus(RunStatus),

    /// Summary cursors only move forward.
    #[error("Summary cursor for scope '{scope}' cannot move back from {current} to {attempted}")]
    CursorRegression {
        scope: String,
        current: i64,
        attempted: i64,
    },
}

impl StoreError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

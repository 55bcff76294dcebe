//! The conversation store contract.

use crate::Result;
use async_trait::async_trait;
use gigwatch_core::{
    AgentRun, AgentStep, ConversationSummary, NewAgentRun, NewMessage, RunStatus, StoredMessage,
    StoredStep,
};

/// Durable log of messages, agent runs, run steps, and summaries.
///
/// Implementations assign message ids, run ids, and step indices on a
/// single writer path so that ids are totally ordered and step indices are
/// contiguous from 1 within each run.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message and return it with its assigned id.
    async fn insert_message(&self, message: NewMessage) -> Result<StoredMessage>;

    /// Visible messages with `id <= max_id`, newest `limit`, in ascending order.
    async fn list_visible_up_to(&self, max_id: i64, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Newest `limit` visible messages, in ascending order.
    async fn list_visible_latest(&self, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Visible messages with `id > min_id`, oldest first, at most `limit`.
    async fn list_visible_after(&self, min_id: i64, limit: usize) -> Result<Vec<StoredMessage>>;

    /// The summary for `scope`, or an empty one if it was never written.
    async fn get_summary(&self, scope: &str) -> Result<ConversationSummary>;

    /// Replace the summary for `scope`.
    ///
    /// Fails with [`StoreError::CursorRegression`](crate::StoreError::CursorRegression)
    /// when `until_message_id` is below the stored cursor.
    async fn upsert_summary(
        &self,
        scope: &str,
        until_message_id: i64,
        summary_text: &str,
    ) -> Result<ConversationSummary>;

    /// Open a run in the `running` state.
    async fn start_run(&self, run: NewAgentRun) -> Result<AgentRun>;

    /// Move a running run to a terminal status. Happens at most once per run.
    async fn finish_run(&self, run_id: i64, status: RunStatus, error: Option<&str>) -> Result<AgentRun>;

    async fn get_run(&self, run_id: i64) -> Result<Option<AgentRun>>;

    /// Newest `limit` runs, in ascending id order.
    async fn list_runs(&self, limit: usize) -> Result<Vec<AgentRun>>;

    /// Append a step to a running run, assigning the next index.
    async fn append_step(&self, run_id: i64, step: AgentStep) -> Result<StoredStep>;

    /// All steps of a run, ordered by index.
    async fn list_steps(&self, run_id: i64) -> Result<Vec<StoredStep>>;
}

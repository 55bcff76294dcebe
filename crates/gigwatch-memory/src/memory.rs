//! In-memory conversation store.

use crate::error::StoreError;
use crate::store::ConversationStore;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use gigwatch_core::{
    AgentRun, AgentStep, ConversationSummary, NewAgentRun, NewMessage, RunStatus, StoredMessage,
    StoredStep,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    messages: Vec<StoredMessage>,
    summaries: HashMap<String, ConversationSummary>,
    runs: Vec<AgentRun>,
    steps: HashMap<i64, Vec<StoredStep>>,
    next_step_id: i64,
}

/// Non-durable store. Ids start at 1 and follow insertion order.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<Inner>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn visible(messages: &[StoredMessage]) -> impl Iterator<Item = &StoredMessage> {
    messages.iter().filter(|m| m.visible)
}

/// Keep the last `limit` items of an ascending list.
fn tail<T: Clone>(items: Vec<T>, limit: usize) -> Vec<T> {
    let skip = items.len().saturating_sub(limit);
    items.into_iter().skip(skip).collect()
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn insert_message(&self, message: NewMessage) -> Result<StoredMessage> {
        let mut inner = self.inner.write().await;
        let stored = StoredMessage {
            id: inner.messages.len() as i64 + 1,
            role: message.role,
            content: message.content,
            source: message.source,
            external_chat_id: message.external_chat_id,
            external_user_id: message.external_user_id,
            visible: message.visible,
            metadata: message.metadata,
            created_at: Utc::now(),
        };
        inner.messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_visible_up_to(&self, max_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        let matching = visible(&inner.messages)
            .filter(|m| m.id <= max_id)
            .cloned()
            .collect();
        Ok(tail(matching, limit))
    }

    async fn list_visible_latest(&self, limit: usize) -> Result<Vec<StoredMessage>> {
        self.list_visible_up_to(i64::MAX, limit).await
    }

    async fn list_visible_after(&self, min_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        Ok(visible(&inner.messages)
            .filter(|m| m.id > min_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_summary(&self, scope: &str) -> Result<ConversationSummary> {
        let inner = self.inner.read().await;
        Ok(inner
            .summaries
            .get(scope)
            .cloned()
            .unwrap_or_else(|| ConversationSummary::empty(scope)))
    }

    async fn upsert_summary(
        &self,
        scope: &str,
        until_message_id: i64,
        summary_text: &str,
    ) -> Result<ConversationSummary> {
        let mut inner = self.inner.write().await;
        if let Some(current) = inner.summaries.get(scope) {
            if until_message_id < current.until_message_id {
                return Err(StoreError::CursorRegression {
                    scope: scope.to_string(),
                    current: current.until_message_id,
                    attempted: until_message_id,
                });
            }
        }

        let summary = ConversationSummary {
            scope: scope.to_string(),
            until_message_id,
            summary_text: summary_text.to_string(),
            updated_at: Utc::now(),
        };
        inner.summaries.insert(scope.to_string(), summary.clone());
        Ok(summary)
    }

    async fn start_run(&self, run: NewAgentRun) -> Result<AgentRun> {
        let mut inner = self.inner.write().await;
        let stored = AgentRun {
            id: inner.runs.len() as i64 + 1,
            trigger_message_id: run.trigger_message_id,
            source: run.source,
            status: RunStatus::Running,
            model: run.model,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            metadata: run.metadata,
        };
        inner.runs.push(stored.clone());
        Ok(stored)
    }

    async fn finish_run(&self, run_id: i64, status: RunStatus, error: Option<&str>) -> Result<AgentRun> {
        if !status.is_terminal() {
            return Err(StoreError::NonTerminalStatus(status));
        }

        let mut inner = self.inner.write().await;
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or(StoreError::RunNotFound(run_id))?;

        if run.status.is_terminal() {
            return Err(StoreError::RunAlreadyFinished {
                run_id,
                status: run.status,
            });
        }

        run.status = status;
        run.error = error.map(str::to_string);
        run.finished_at = Some(Utc::now());
        Ok(run.clone())
    }

    async fn get_run(&self, run_id: i64) -> Result<Option<AgentRun>> {
        let inner = self.inner.read().await;
        Ok(inner.runs.iter().find(|r| r.id == run_id).cloned())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<AgentRun>> {
        let inner = self.inner.read().await;
        Ok(tail(inner.runs.clone(), limit))
    }

    async fn append_step(&self, run_id: i64, step: AgentStep) -> Result<StoredStep> {
        let mut inner = self.inner.write().await;
        let status = inner
            .runs
            .iter()
            .find(|r| r.id == run_id)
            .map(|r| r.status)
            .ok_or(StoreError::RunNotFound(run_id))?;
        if status.is_terminal() {
            return Err(StoreError::RunAlreadyFinished { run_id, status });
        }

        inner.next_step_id += 1;
        let id = inner.next_step_id;
        let steps = inner.steps.entry(run_id).or_default();
        let stored = StoredStep {
            id,
            run_id,
            step_index: steps.len() as i64 + 1,
            step_type: step.step_type,
            tool_name: step.tool_name,
            payload: step.payload,
            created_at: Utc::now(),
        };
        steps.push(stored.clone());
        Ok(stored)
    }

    async fn list_steps(&self, run_id: i64) -> Result<Vec<StoredStep>> {
        let inner = self.inner.read().await;
        Ok(inner.steps.get(&run_id).cloned().unwrap_or_default())
    }
}

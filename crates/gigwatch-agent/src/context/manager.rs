//! Token-budgeted prompt assembly and incremental history compaction.

use super::ContextSummarizer;
use crate::Result;
use gigwatch_core::config::ContextConfig;
use gigwatch_core::context::{estimate_tokens, ContextWindows};
use gigwatch_core::{ChatMessage, Role, StoredMessage};
use gigwatch_memory::ConversationStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

const MIN_PROMPT_BUDGET: usize = 1024;
const FRAMING_TOKENS: usize = 64;
const PER_MESSAGE_TOKENS: usize = 12;
const PENDING_FETCH_LIMIT: usize = 500;

const SUMMARY_HEADER: &str = "Long-term memory summary (compressed from earlier conversation):";

/// A prompt ready to send, with its budget figures.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptBuild {
    pub messages: Vec<ChatMessage>,
    pub model_context_window: usize,
    pub prompt_token_budget: usize,
    pub estimated_prompt_tokens: usize,
}

/// Result of a compaction pass that folded messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionOutcome {
    /// Messages folded into the summary.
    pub folded: usize,
    /// New summary cursor.
    pub cursor: i64,
}

/// Builds bounded prompts and keeps the long-term summary current.
pub struct ContextManager {
    store: Arc<dyn ConversationStore>,
    summarizer: ContextSummarizer,
    windows: ContextWindows,
    config: ContextConfig,
    /// Serializes compaction passes so two turns do not fold the same rows.
    compaction: Mutex<()>,
}

impl ContextManager {
    pub fn new(store: Arc<dyn ConversationStore>, summarizer: ContextSummarizer, config: ContextConfig) -> Self {
        let windows = ContextWindows::new()
            .with_overrides(&config.extra_windows)
            .with_default_window(config.default_window);
        Self {
            store,
            summarizer,
            windows,
            config,
            compaction: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Context window for `model`.
    pub fn context_window(&self, model: Option<&str>) -> usize {
        self.windows.resolve(model)
    }

    /// Prompt budget for a context window.
    pub fn prompt_budget(&self, window: usize) -> usize {
        let scaled = (window as f64 * self.config.budget_ratio).floor() as usize;
        scaled.max(MIN_PROMPT_BUDGET)
    }

    /// Build the prompt for a turn from history at or before `cutoff_message_id`.
    ///
    /// The result is the system prompt, an optional summary block, and the
    /// longest contiguous tail of history that fits the budget. The newest
    /// message is always included.
    pub async fn build_prompt(
        &self,
        cutoff_message_id: i64,
        system_prompt: &str,
        model: Option<&str>,
    ) -> Result<PromptBuild> {
        let summary = self.store.get_summary(&self.config.scope).await?;
        let recent = self
            .store
            .list_visible_up_to(cutoff_message_id, self.config.fetch_limit)
            .await?;

        let model_context_window = self.context_window(model);
        let prompt_token_budget = self.prompt_budget(model_context_window);

        let summary_prompt = (!summary.summary_text.is_empty())
            .then(|| format!("{}\n{}", SUMMARY_HEADER, summary.summary_text));
        let fixed_tokens = estimate_tokens(system_prompt)
            + summary_prompt.as_deref().map(estimate_tokens).unwrap_or(0)
            + FRAMING_TOKENS;
        // No floor: when the fixed part eats the budget only the newest message goes in.
        let history_budget = prompt_token_budget.saturating_sub(fixed_tokens);

        let (selected, used) = pack_history(&recent, history_budget);

        let mut messages = Vec::with_capacity(selected.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        if let Some(summary_prompt) = summary_prompt {
            messages.push(ChatMessage::system(summary_prompt));
        }
        messages.extend(selected.iter().map(|m| to_chat_message(m)));

        debug!(
            window = model_context_window,
            budget = prompt_token_budget,
            candidates = recent.len(),
            selected = selected.len(),
            "Built prompt"
        );

        Ok(PromptBuild {
            messages,
            model_context_window,
            prompt_token_budget,
            estimated_prompt_tokens: fixed_tokens + used,
        })
    }

    /// Fold old pending messages into the summary if enough have piled up.
    ///
    /// The newest `keep_recent` pending messages are never folded. Returns
    /// `None` when nothing was folded.
    pub async fn maybe_compact_history(&self) -> Result<Option<CompactionOutcome>> {
        let _guard = self.compaction.lock().await;

        let summary = self.store.get_summary(&self.config.scope).await?;
        let pending = self
            .store
            .list_visible_after(summary.until_message_id, PENDING_FETCH_LIMIT)
            .await?;

        let foldable = pending.len().saturating_sub(self.config.keep_recent);
        if foldable < self.config.min_summarize || foldable == 0 {
            return Ok(None);
        }
        let batch = &pending[..foldable.min(self.config.max_batch)];
        let Some(last) = batch.last() else {
            return Ok(None);
        };

        let text = self.summarizer.summarize(&summary.summary_text, batch).await;
        let updated = self
            .store
            .upsert_summary(&self.config.scope, last.id, &text)
            .await?;

        info!(
            scope = %self.config.scope,
            folded = batch.len(),
            cursor = updated.until_message_id,
            "Compacted history"
        );

        Ok(Some(CompactionOutcome {
            folded: batch.len(),
            cursor: updated.until_message_id,
        }))
    }
}

/// Walk backwards from the newest message, stopping at the first one that
/// does not fit. Returns the selection in chronological order and its cost.
fn pack_history(recent: &[StoredMessage], budget: usize) -> (Vec<&StoredMessage>, usize) {
    let mut selected = Vec::new();
    let mut used = 0;
    for message in recent.iter().rev() {
        let cost = estimate_tokens(&message.content) + PER_MESSAGE_TOKENS;
        if !selected.is_empty() && used + cost > budget {
            break;
        }
        selected.push(message);
        used += cost;
    }
    selected.reverse();
    (selected, used)
}

fn to_chat_message(message: &StoredMessage) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone()),
        Role::User => ChatMessage::user(message.content.clone()),
        // Tool rows are replayed as assistant content.
        Role::Assistant | Role::Tool => ChatMessage::assistant(message.content.clone()),
    }
}

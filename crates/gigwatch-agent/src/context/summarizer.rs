//! Folds old turns into a bounded summary.

use crate::providers::ModelProvider;
use gigwatch_core::{ChatMessage, Role, StoredMessage};
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_MAX_CHARS: usize = 4000;
const LINE_MAX_CHARS: usize = 320;

const SUMMARY_INSTRUCTION: &str = "You maintain the long-term memory of a conversation. \
Write a concise summary that keeps user preferences, confirmed facts, open to-dos and decisions. \
Do not invent anything. Stay under 1000 words.";

/// Incremental conversation summarizer.
///
/// Uses the model when one is configured and falls back to a deterministic
/// line digest otherwise, or whenever the model call fails.
pub struct ContextSummarizer {
    provider: Option<Arc<dyn ModelProvider>>,
    max_chars: usize,
}

impl ContextSummarizer {
    pub fn new(provider: Option<Arc<dyn ModelProvider>>) -> Self {
        Self {
            provider,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    /// Merge `messages` into `existing`.
    pub async fn summarize(&self, existing: &str, messages: &[StoredMessage]) -> String {
        if messages.is_empty() {
            return existing.to_string();
        }
        let Some(provider) = &self.provider else {
            return fallback_summary(existing, messages, self.max_chars);
        };

        let transcript = messages
            .iter()
            .filter_map(transcript_line)
            .collect::<Vec<_>>()
            .join("\n");
        let existing_block = if existing.is_empty() { "(none)" } else { existing };
        let request = [
            ChatMessage::system(SUMMARY_INSTRUCTION),
            ChatMessage::user(format!(
                "Existing summary:\n{}\n\nNew conversation:\n{}",
                existing_block, transcript
            )),
        ];

        match provider.complete(&request, &[]).await {
            Ok(completion) => {
                let text = completion.reply_text();
                if text.is_empty() {
                    warn!("Summarizer returned empty text, using fallback");
                    return fallback_summary(existing, messages, self.max_chars);
                }
                debug!(folded = messages.len(), "Summarized with model");
                text.chars().take(self.max_chars).collect()
            }
            Err(e) => {
                warn!(error = %e, "Summarization failed, using fallback");
                fallback_summary(existing, messages, self.max_chars)
            }
        }
    }
}

/// One role-prefixed, whitespace-collapsed line per user or assistant message.
fn transcript_line(message: &StoredMessage) -> Option<String> {
    let prefix = match message.role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System | Role::Tool => return None,
    };
    let compact = message.content.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = compact.chars().take(LINE_MAX_CHARS).collect();
    Some(format!("{}: {}", prefix, capped))
}

/// Deterministic summary: existing text plus transcript lines, keeping only
/// the trailing `max_chars` characters.
pub(crate) fn fallback_summary(existing: &str, messages: &[StoredMessage], max_chars: usize) -> String {
    let mut lines = Vec::with_capacity(messages.len() + 1);
    let existing = existing.trim();
    if !existing.is_empty() {
        lines.push(existing.to_string());
    }
    lines.extend(messages.iter().filter_map(transcript_line));

    let merged = lines.join("\n");
    let total = merged.chars().count();
    if total <= max_chars {
        return merged;
    }
    merged.chars().skip(total - max_chars).collect()
}

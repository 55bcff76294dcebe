//! Prompt budgeting and long-term memory.

mod manager;
mod summarizer;

pub use manager::{CompactionOutcome, ContextManager, PromptBuild};
pub use summarizer::ContextSummarizer;

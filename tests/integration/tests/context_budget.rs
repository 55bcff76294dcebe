//! Long conversations under a tight context window.

use gigwatch_agent::{Completion, RuntimeConfig, ToolRegistry};
use gigwatch_core::config::ContextConfig;
use gigwatch_core::{ChatSource, IncomingMessage, Role};
use gigwatch_integration_tests::{sqlite_service, ScriptedProvider};
use gigwatch_memory::ConversationStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TURNS: usize = 25;

fn tight_context() -> ContextConfig {
    let mut extra_windows = HashMap::new();
    extra_windows.insert("tiny-model".to_string(), 1667);
    ContextConfig {
        extra_windows,
        summary_max_chars: 400,
        ..ContextConfig::default()
    }
}

fn long_text(prefix: &str, turn: usize) -> String {
    let head = format!("{} {} ", prefix, turn);
    format!("{}{}", head, "x".repeat(400 - head.len()))
}

#[tokio::test]
async fn test_prompts_stay_within_budget() {
    let script = (0..TURNS)
        .map(|turn| Ok(Completion::text(long_text("answer", turn))))
        .collect();
    let provider = Arc::new(ScriptedProvider::new(script).with_model("tiny-model"));
    let (store, service) = sqlite_service(
        provider.clone(),
        ToolRegistry::new(),
        RuntimeConfig::default(),
        tight_context(),
    )
    .await;

    for turn in 0..TURNS {
        let question = long_text("question", turn);
        let reply = service
            .handle_incoming_message(IncomingMessage::new(ChatSource::Web, question.clone()))
            .await
            .unwrap();
        assert!(reply.text.starts_with(&format!("answer {} ", turn)));

        let history = service.list_visible_messages(Some(1)).await.unwrap();
        let metadata = &history[0].metadata;
        assert_eq!(metadata["modelContextWindow"], 1667);
        assert_eq!(metadata["promptTokenBudget"], 1200);
        let estimated = metadata["estimatedPromptTokens"].as_u64().unwrap();
        assert!(estimated <= 1200, "turn {} estimated {}", turn, estimated);

        // The current question is always the last prompt message.
        let prompt = provider.prompts().pop().unwrap();
        assert_eq!(prompt.last().unwrap().content_str(), question);
        assert_eq!(prompt[0].role, Role::System);
    }

    // Older turns were dropped from the prompt rather than overflowing it.
    let last_prompt = provider.prompts().pop().unwrap();
    assert!(last_prompt.len() < 2 * TURNS);

    // Compaction runs in the background after each turn.
    let mut summary = store.get_summary("global").await.unwrap();
    for _ in 0..50 {
        if summary.until_message_id > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        summary = store.get_summary("global").await.unwrap();
    }
    assert!(summary.until_message_id > 0);
    assert!(summary.summary_text.chars().count() <= 400);
    assert_eq!(store.list_visible_latest(100).await.unwrap().len(), 2 * TURNS);
}

//! Channel events routed into a real ChatService.

use gigwatch_agent::{Completion, RuntimeConfig, ToolRegistry};
use gigwatch_channels::{ChannelDispatcher, DispatchOutcome, EventDeduplicator, InboundEvent};
use gigwatch_core::config::ContextConfig;
use gigwatch_core::{ChatSource, IncomingMessage};
use gigwatch_integration_tests::{sqlite_service, RecordingSender, ScriptedProvider};
use gigwatch_memory::ConversationStore;
use std::sync::Arc;
use std::time::Duration;

fn telegram(event_id: &str, chat_id: &str, text: &str) -> InboundEvent {
    InboundEvent::new(
        IncomingMessage::new(ChatSource::Telegram, text)
            .with_chat_id(chat_id)
            .with_user_id("u-1"),
    )
    .with_event_id(event_id)
}

#[tokio::test]
async fn test_redelivered_event_runs_one_turn() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(Completion::text("Nothing new today.")),
        Ok(Completion::text("unused")),
    ]));
    let (store, service) = sqlite_service(
        provider.clone(),
        ToolRegistry::new(),
        RuntimeConfig::default(),
        ContextConfig::default(),
    )
    .await;
    let sender = Arc::new(RecordingSender::default());
    let dispatcher = ChannelDispatcher::new(Arc::new(service), sender.clone())
        .with_allowed_chat(Some("42".to_string()));
    let mut dedup = EventDeduplicator::new(Duration::from_secs(6 * 3600), 5000);

    let first = dispatcher.dispatch(&mut dedup, telegram("upd-1", "42", "news?")).await;
    let again = dispatcher.dispatch(&mut dedup, telegram("upd-1", "42", "news?")).await;
    let stranger = dispatcher.dispatch(&mut dedup, telegram("upd-2", "99", "hi")).await;

    match first {
        DispatchOutcome::Replied { reply, delivered } => {
            assert!(delivered);
            assert_eq!(reply.text, "Nothing new today.");
        }
        other => panic!("expected reply, got {:?}", other),
    }
    assert_eq!(again, DispatchOutcome::Duplicate);
    assert_eq!(stranger, DispatchOutcome::Filtered);

    assert_eq!(
        *sender.sent.lock().unwrap(),
        vec![("42".to_string(), "Nothing new today.".to_string())]
    );
    assert_eq!(provider.prompts().len(), 1);

    let runs = store.list_runs(10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].source, "telegram");
    assert_eq!(runs[0].metadata["externalChatId"], "42");
    assert_eq!(runs[0].metadata["externalUserId"], "u-1");
}

#[tokio::test]
async fn test_blank_event_never_reaches_service() {
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let (store, service) = sqlite_service(
        provider,
        ToolRegistry::new(),
        RuntimeConfig::default(),
        ContextConfig::default(),
    )
    .await;
    let sender = Arc::new(RecordingSender::default());
    let dispatcher = ChannelDispatcher::new(Arc::new(service), sender.clone());
    let mut dedup = EventDeduplicator::new(Duration::from_secs(60), 10);

    let outcome = dispatcher.dispatch(&mut dedup, telegram("upd-9", "42", "  ")).await;
    assert_eq!(outcome, DispatchOutcome::Ignored);
    assert!(sender.sent.lock().unwrap().is_empty());
    assert!(store.list_runs(10).await.unwrap().is_empty());
}

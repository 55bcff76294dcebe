//! One-shot chat and history commands.

use anyhow::Context;
use gigwatch_agent::ChatService;
use gigwatch_core::{ChatSource, Config, IncomingMessage, StoredMessage};
use gigwatch_memory::SqliteConversationStore;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

async fn open_service(config_path: Option<&Path>) -> anyhow::Result<ChatService> {
    let config = Config::resolve(config_path).context("Failed to load configuration")?;
    let db_path = &config.storage.database_path;
    debug!(path = %db_path.display(), "Opening conversation store");

    let store = SqliteConversationStore::connect(db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    Ok(ChatService::from_config(&config, Arc::new(store))?)
}

/// Run one turn and print the reply.
pub async fn send(config_path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    let service = open_service(config_path).await?;
    let reply = service
        .handle_incoming_message(IncomingMessage::new(ChatSource::Tui, text))
        .await?;

    println!("{}", reply.text);
    // The process exits next; compaction must land first.
    service.flush_compaction().await;
    debug!(
        run_id = reply.run_id,
        user_message_id = reply.user_message_id,
        assistant_message_id = reply.assistant_message_id,
        "Reply stored"
    );
    Ok(())
}

/// Print the most recent visible messages, oldest first.
pub async fn history(config_path: Option<&Path>, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let service = open_service(config_path).await?;
    let messages = service.list_visible_messages(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }
    if messages.is_empty() {
        println!("No messages yet.");
        return Ok(());
    }
    for message in &messages {
        println!("{}", format_line(message));
    }
    Ok(())
}

fn format_line(message: &StoredMessage) -> String {
    format!(
        "[{}] #{} {:<9} ({}) {}",
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
        message.id,
        message.role.as_str(),
        message.source,
        message.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use gigwatch_core::Role;
    use serde_json::Value;

    #[test]
    fn test_format_line() {
        let message = StoredMessage {
            id: 7,
            role: Role::Assistant,
            content: "Two new shows.".into(),
            source: "agent".into(),
            external_chat_id: None,
            external_user_id: None,
            visible: true,
            metadata: Value::Null,
            created_at: "2026-03-01T08:30:00Z".parse().unwrap(),
        };
        assert_eq!(
            format_line(&message),
            "[2026-03-01 08:30:00] #7 assistant (agent) Two new shows."
        );
    }
}

//! End-to-end turns through ChatService over SQLite.

use gigwatch_agent::runtime::{FAILURE_REPLY, INCOMPLETE_REPLY};
use gigwatch_agent::tools::BashExecTool;
use gigwatch_agent::{AgentError, ChatService, Completion, RuntimeConfig, ToolRegistry};
use gigwatch_core::config::ContextConfig;
use gigwatch_core::{ChatSource, Config, IncomingMessage, RunStatus, SecretString, StepType};
use gigwatch_integration_tests::{sqlite_service, tool_call, ScriptedProvider};
use gigwatch_memory::{ConversationStore, SqliteConversationStore};
use gigwatch_sandbox::SandboxedExecutor;
use std::sync::Arc;
use tempfile::TempDir;

fn tui(text: &str) -> IncomingMessage {
    IncomingMessage::new(ChatSource::Tui, text)
}

fn bash_tools(root: &TempDir) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools
        .register(Arc::new(BashExecTool::new(SandboxedExecutor::new(root.path()))))
        .unwrap();
    tools
}

#[tokio::test]
async fn test_empty_input_creates_nothing() {
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let (store, service) = sqlite_service(
        provider.clone(),
        ToolRegistry::new(),
        RuntimeConfig::default(),
        ContextConfig::default(),
    )
    .await;

    let err = service.handle_incoming_message(tui("   ")).await.unwrap_err();
    assert!(matches!(err, AgentError::EmptyMessage));
    assert!(store.list_runs(10).await.unwrap().is_empty());
    assert!(store.list_visible_latest(10).await.unwrap().is_empty());
    assert!(provider.prompts().is_empty());
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_run_with_canned_reply() {
    let workdir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.model.api_key = Some(SecretString::new("sk-test"));
    config.model.base_url = "http://127.0.0.1:1".to_string();
    config.sandbox.workdir = Some(workdir.path().to_path_buf());

    let store = Arc::new(SqliteConversationStore::in_memory().await.unwrap());
    let service = ChatService::from_config(&config, store.clone()).unwrap();

    let reply = service.handle_incoming_message(tui("list shows")).await.unwrap();
    assert_eq!(reply.text, FAILURE_REPLY);

    let run = store.get_run(reply.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("provider_error"));
    assert!(run.finished_at.is_some());

    let steps = store.list_steps(reply.run_id).await.unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].step_type, StepType::SystemError);

    let history = service.list_visible_messages(None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, FAILURE_REPLY);
}

#[tokio::test]
async fn test_tool_round_trip_has_contiguous_steps() {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join("monitoring.json"), "{}").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(tool_call("c1", "bash_exec", r#"{"command":"ls","args":["."]}"#)),
        Ok(tool_call("c2", "bash_exec", r#"{"command":"cat","args":["monitoring.json"]}"#)),
        Ok(Completion::text("The config is empty.")),
    ]));
    let (store, service) = sqlite_service(
        provider.clone(),
        bash_tools(&root),
        RuntimeConfig::default(),
        ContextConfig::default(),
    )
    .await;

    let reply = service.handle_incoming_message(tui("what is monitored?")).await.unwrap();
    assert_eq!(reply.text, "The config is empty.");

    let run = store.get_run(reply.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Success);

    let steps = store.list_steps(reply.run_id).await.unwrap();
    let indices: Vec<i64> = steps.iter().map(|s| s.step_index).collect();
    assert_eq!(indices, (1..=7).collect::<Vec<i64>>());

    let types: Vec<StepType> = steps.iter().map(|s| s.step_type).collect();
    assert_eq!(
        types,
        vec![
            StepType::AssistantMessage,
            StepType::ToolCall,
            StepType::ToolResult,
            StepType::AssistantMessage,
            StepType::ToolCall,
            StepType::ToolResult,
            StepType::AssistantMessage,
        ]
    );
    let listing = &steps[2].payload["result"]["data"]["stdout"];
    assert!(listing.as_str().unwrap().contains("monitoring.json"));
    assert_eq!(steps[5].payload["result"]["data"]["stdout"], "{}");

    // The model saw both tool results before answering.
    let last_prompt = provider.prompts().pop().unwrap();
    let tool_messages = last_prompt
        .iter()
        .filter(|m| m.tool_call_id.is_some())
        .count();
    assert_eq!(tool_messages, 2);
}

#[tokio::test]
async fn test_malformed_arguments_are_recovered() {
    let root = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(tool_call("c1", "bash_exec", "{not json")),
        Ok(tool_call("c2", "rm_everything", "{}")),
        Ok(Completion::text("Sorry, I could not do that.")),
    ]));
    let (store, service) = sqlite_service(
        provider,
        bash_tools(&root),
        RuntimeConfig::default(),
        ContextConfig::default(),
    )
    .await;

    let reply = service.handle_incoming_message(tui("do it")).await.unwrap();
    assert_eq!(reply.text, "Sorry, I could not do that.");

    let run = store.get_run(reply.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Success);

    let steps = store.list_steps(reply.run_id).await.unwrap();
    let errors: Vec<_> = steps
        .iter()
        .filter(|s| s.step_type == StepType::SystemError)
        .collect();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].tool_name.as_deref(), Some("bash_exec"));
    assert_eq!(errors[1].tool_name.as_deref(), Some("rm_everything"));
    assert!(!steps.iter().any(|s| s.step_type == StepType::ToolCall));
}

#[tokio::test]
async fn test_iteration_cap_ends_turn() {
    let root = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::repeating(tool_call(
        "loop",
        "bash_exec",
        r#"{"command":"pwd"}"#,
    )));
    let (store, service) = sqlite_service(
        provider.clone(),
        bash_tools(&root),
        RuntimeConfig {
            max_iterations: 4,
            result_list_cap: 10,
        },
        ContextConfig::default(),
    )
    .await;

    let reply = service.handle_incoming_message(tui("loop forever")).await.unwrap();
    assert_eq!(reply.text, INCOMPLETE_REPLY);
    assert_eq!(provider.prompts().len(), 4);

    let run = store.get_run(reply.run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("max_iterations_reached"));

    let steps = store.list_steps(reply.run_id).await.unwrap();
    assert_eq!(steps.len(), 13);
    assert_eq!(steps[12].step_type, StepType::SystemError);
}

#[tokio::test]
async fn test_runs_and_messages_interleave_in_order() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(Completion::text("first")),
        Ok(Completion::text("second")),
    ]));
    let (store, service) = sqlite_service(
        provider,
        ToolRegistry::new(),
        RuntimeConfig::default(),
        ContextConfig::default(),
    )
    .await;

    let a = service.handle_incoming_message(tui("one")).await.unwrap();
    let b = service.handle_incoming_message(tui("two")).await.unwrap();

    assert!(a.user_message_id < a.assistant_message_id);
    assert!(a.assistant_message_id < b.user_message_id);
    assert!(a.run_id < b.run_id);

    let contents: Vec<String> = service
        .list_visible_messages(Some(3))
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first", "two", "second"]);
    assert_eq!(store.list_runs(10).await.unwrap().len(), 2);
}

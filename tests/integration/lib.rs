//! Shared fixtures for the scenario tests.

use async_trait::async_trait;
use gigwatch_agent::context::{ContextManager, ContextSummarizer};
use gigwatch_agent::{AgentError, AgentRuntime, ChatService, Completion, ModelProvider, RuntimeConfig, ToolRegistry};
use gigwatch_channels::{ChannelError, OutboundSender};
use gigwatch_core::config::ContextConfig;
use gigwatch_core::{ChatMessage, ToolCallRequest, ToolDefinition};
use gigwatch_memory::{ConversationStore, SqliteConversationStore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays canned completions in order and records every prompt it sees.
pub struct ScriptedProvider {
    model: String,
    script: Mutex<VecDeque<Result<Completion, AgentError>>>,
    fallback: Option<Completion>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Completion, AgentError>>) -> Self {
        Self {
            model: "scripted-model".to_string(),
            script: Mutex::new(script.into()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same completion once the script runs out.
    pub fn repeating(completion: Completion) -> Self {
        Self {
            fallback: Some(completion),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<Completion, AgentError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| AgentError::provider("script exhausted"))
    }
}

/// Records every outbound reply.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl OutboundSender for RecordingSender {
    fn channel(&self) -> &str {
        "test"
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> Completion {
    Completion::tool_calls(vec![ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }])
}

/// A ChatService over a fresh in-memory SQLite store. The summarizer never
/// calls the model, so scripts only cover turn completions.
pub async fn sqlite_service(
    provider: Arc<ScriptedProvider>,
    tools: ToolRegistry,
    runtime: RuntimeConfig,
    context: ContextConfig,
) -> (Arc<dyn ConversationStore>, ChatService) {
    let store: Arc<dyn ConversationStore> =
        Arc::new(SqliteConversationStore::in_memory().await.unwrap());
    let context = Arc::new(ContextManager::new(
        Arc::clone(&store),
        ContextSummarizer::new(None).with_max_chars(context.summary_max_chars),
        context,
    ));
    let runtime = AgentRuntime::new(Some(provider as Arc<dyn ModelProvider>), Arc::new(tools))
        .with_config(runtime);
    let service = ChatService::new(Arc::clone(&store), context, runtime)
        .with_system_prompt(Some("You are a test assistant.".to_string()));
    (store, service)
}

//! One persisted chat turn per inbound message.

use crate::context::{ContextManager, ContextSummarizer};
use crate::error::AgentError;
use crate::providers::{ModelProvider, OpenAICompatibleProvider};
use crate::runtime::{AgentRuntime, RuntimeConfig, FAILURE_REPLY};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use gigwatch_channels::{ChannelError, MessageHandler};
use gigwatch_core::{
    AgentRun, AgentStep, ChatReply, Config, IncomingMessage, NewAgentRun, NewMessage, Role,
    RunStatus, StoredMessage, AGENT_SOURCE,
};
use gigwatch_memory::ConversationStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default number of messages returned by [`ChatService::list_visible_messages`].
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

const DEFAULT_STEP_PAYLOAD_LIMIT: usize = 6000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are the GigWatch assistant. Users describe tasks in natural language and you complete them by calling the provided tools.

Key files (relative to the project root):
- Monitoring config: ./config/monitoring.json
- City dictionary: ./src/dictionary/showstartCities.ts
- Show style dictionary: ./src/dictionary/showstartShowStyles.ts

File operations:
- Prefer the bash_exec tool for reading or inspecting project files.
- Use native Unix commands such as find, grep, ls, cat, sed, head and tail.
- bash_exec takes a command and an argument list only. Shell pipes and redirection are not supported.

Answering:
- Ask first if required information is missing. If the available tools cannot do the task, say so plainly.";

/// Ties prompt building, the agent loop, and persistence into one turn.
pub struct ChatService {
    store: Arc<dyn ConversationStore>,
    context: Arc<ContextManager>,
    runtime: AgentRuntime,
    system_prompt: String,
    step_payload_limit: usize,
    /// Background compaction passes not yet awaited.
    compactions: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatService {
    pub fn new(store: Arc<dyn ConversationStore>, context: Arc<ContextManager>, runtime: AgentRuntime) -> Self {
        Self {
            store,
            context,
            runtime,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            step_payload_limit: DEFAULT_STEP_PAYLOAD_LIMIT,
            compactions: Mutex::new(Vec::new()),
        }
    }

    /// Wire a service from configuration: provider, built-in tools,
    /// summarizer and context manager.
    pub fn from_config(config: &Config, store: Arc<dyn ConversationStore>) -> Result<Self> {
        let provider: Option<Arc<dyn ModelProvider>> =
            match OpenAICompatibleProvider::from_config(&config.model)? {
                Some(p) => Some(Arc::new(p)),
                None => {
                    warn!("No API key configured; replies will be canned");
                    None
                }
            };

        let tools = Arc::new(ToolRegistry::with_defaults(config)?);
        let summarizer =
            ContextSummarizer::new(provider.clone()).with_max_chars(config.context.summary_max_chars);
        let context = Arc::new(ContextManager::new(
            Arc::clone(&store),
            summarizer,
            config.context.clone(),
        ));
        let runtime =
            AgentRuntime::new(provider, tools).with_config(RuntimeConfig::from(&config.agent));

        Ok(Self::new(store, context, runtime)
            .with_system_prompt(config.agent.system_prompt.clone())
            .with_step_payload_limit(config.agent.step_payload_limit))
    }

    /// Replace the built-in system prompt. Blank values are ignored.
    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        if let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) {
            self.system_prompt = prompt;
        }
        self
    }

    pub fn with_step_payload_limit(mut self, limit: usize) -> Self {
        self.step_payload_limit = limit.max(1);
        self
    }

    pub fn runtime(&self) -> &AgentRuntime {
        &self.runtime
    }

    pub fn context(&self) -> &Arc<ContextManager> {
        &self.context
    }

    /// Run one turn for an inbound message.
    ///
    /// Only empty text is rejected. Once the run is open every failure is
    /// recorded on it and answered with a canned reply.
    pub async fn handle_incoming_message(&self, message: IncomingMessage) -> Result<ChatReply> {
        let text = message.text.trim();
        if text.is_empty() {
            return Err(AgentError::EmptyMessage);
        }

        let user_message = self
            .store
            .insert_message(
                NewMessage::new(Role::User, text, message.source.as_str())
                    .with_external_ids(message.external_chat_id.clone(), message.external_user_id.clone())
                    .with_metadata(message.metadata.clone().unwrap_or(Value::Null)),
            )
            .await?;

        let run = self
            .store
            .start_run(NewAgentRun {
                trigger_message_id: Some(user_message.id),
                source: message.source.as_str().to_string(),
                model: self.runtime.model().map(str::to_string),
                metadata: json!({
                    "externalChatId": message.external_chat_id,
                    "externalUserId": message.external_user_id,
                }),
            })
            .await?;

        debug!(run_id = run.id, source = %message.source, "Started run");

        match self.complete_turn(&run, &user_message, &message).await {
            Ok(reply) => {
                self.spawn_compaction().await;
                Ok(reply)
            }
            Err(e) => {
                error!(run_id = run.id, error = %e, "Failed to handle message");
                let error_text = e.to_string();
                self.mark_failed(run.id, &error_text).await;

                let assistant = self
                    .store
                    .insert_message(
                        NewMessage::new(Role::Assistant, FAILURE_REPLY, AGENT_SOURCE)
                            .with_external_ids(
                                message.external_chat_id.clone(),
                                message.external_user_id.clone(),
                            )
                            .with_metadata(json!({ "runId": run.id, "error": error_text })),
                    )
                    .await?;

                Ok(ChatReply {
                    text: FAILURE_REPLY.to_string(),
                    user_message_id: user_message.id,
                    assistant_message_id: assistant.id,
                    run_id: run.id,
                })
            }
        }
    }

    async fn complete_turn(
        &self,
        run: &AgentRun,
        user_message: &StoredMessage,
        message: &IncomingMessage,
    ) -> Result<ChatReply> {
        let prompt = self
            .context
            .build_prompt(user_message.id, &self.system_prompt, self.runtime.model())
            .await?;

        let outcome = self.runtime.run_turn(prompt.messages).await;

        for step in outcome.steps {
            let step = AgentStep {
                payload: trim_step_payload(step.payload, self.step_payload_limit),
                ..step
            };
            self.store.append_step(run.id, step).await?;
        }

        let assistant = self
            .store
            .insert_message(
                NewMessage::new(Role::Assistant, outcome.reply.as_str(), AGENT_SOURCE)
                    .with_external_ids(message.external_chat_id.clone(), message.external_user_id.clone())
                    .with_metadata(json!({
                        "runId": run.id,
                        "estimatedPromptTokens": prompt.estimated_prompt_tokens,
                        "promptTokenBudget": prompt.prompt_token_budget,
                        "modelContextWindow": prompt.model_context_window,
                    })),
            )
            .await?;

        // The reply is stored, so a finalize error must not produce a second one.
        let failure = outcome.status.failure().map(|kind| kind.as_str());
        if let Err(e) = self
            .store
            .finish_run(run.id, outcome.status.run_status(), failure)
            .await
        {
            error!(run_id = run.id, error = %e, "Failed to finalize run");
            self.mark_failed(run.id, &e.to_string()).await;
        }

        info!(
            run_id = run.id,
            status = %outcome.status.run_status(),
            iterations = outcome.iterations,
            "Turn finished"
        );

        Ok(ChatReply {
            text: outcome.reply,
            user_message_id: user_message.id,
            assistant_message_id: assistant.id,
            run_id: run.id,
        })
    }

    async fn mark_failed(&self, run_id: i64, error_text: &str) {
        if let Err(e) = self
            .store
            .finish_run(run_id, RunStatus::Failed, Some(error_text))
            .await
        {
            warn!(run_id, error = %e, "Could not mark run failed");
        }
    }

    async fn spawn_compaction(&self) {
        let context = Arc::clone(&self.context);
        let handle = tokio::spawn(async move {
            if let Err(e) = context.maybe_compact_history().await {
                warn!(error = %e, "History compaction failed");
            }
        });

        let mut pending = self.compactions.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every compaction pass started by earlier turns.
    ///
    /// Short-lived callers must call this before the runtime shuts down,
    /// or in-flight passes are dropped.
    pub async fn flush_compaction(&self) {
        let handles = std::mem::take(&mut *self.compactions.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "History compaction task did not complete");
            }
        }
    }

    /// Most recent visible messages in ascending id order.
    pub async fn list_visible_messages(&self, limit: Option<usize>) -> Result<Vec<StoredMessage>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        Ok(self.store.list_visible_latest(limit).await?)
    }
}

#[async_trait]
impl MessageHandler for ChatService {
    async fn handle(&self, message: IncomingMessage) -> std::result::Result<ChatReply, ChannelError> {
        self.handle_incoming_message(message).await.map_err(ChannelError::from)
    }
}

/// Replace a payload whose JSON form exceeds `limit` chars with a preview.
fn trim_step_payload(payload: Value, limit: usize) -> Value {
    let raw = payload.to_string();
    if raw.chars().count() <= limit {
        return payload;
    }
    let preview: String = raw.chars().take(limit).collect();
    json!({ "truncated": true, "preview": preview })
}

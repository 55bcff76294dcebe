//! The tool-calling loop.

use crate::error::AgentError;
use crate::providers::ModelProvider;
use crate::tools::ToolRegistry;
use gigwatch_core::config::AgentSettings;
use gigwatch_core::{AgentStep, ChatMessage, RunStatus, StepType, ToolCallRequest, ToolOutput};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Reply when the loop fails on a provider error.
pub const FAILURE_REPLY: &str = "Something went wrong while handling your request. Please try again later.";

/// Reply when the loop runs out of iterations.
pub const INCOMPLETE_REPLY: &str = "The task could not be completed. Please try rephrasing your request.";

/// Reply when no model endpoint is configured.
pub const NOT_CONFIGURED_REPLY: &str =
    "OPENAI_API_KEY is not configured, so natural-language tasks are unavailable. Configure it and try again.";

/// Configuration for the agent runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Completion requests allowed per turn.
    pub max_iterations: usize,

    /// List fields in tool results are cut to this many items.
    pub result_list_cap: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from(&AgentSettings::default())
    }
}

impl From<&AgentSettings> for RuntimeConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_iterations: settings.max_iterations.max(1),
            result_list_cap: settings.result_list_cap,
        }
    }
}

/// Why a turn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotConfigured,
    Provider,
    IterationLimit,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Provider => "provider_error",
            Self::IterationLimit => "max_iterations_reached",
        }
    }

    /// Canned user-facing reply for this failure.
    pub fn reply(&self) -> &'static str {
        match self {
            Self::NotConfigured => NOT_CONFIGURED_REPLY,
            Self::Provider => FAILURE_REPLY,
            Self::IterationLimit => INCOMPLETE_REPLY,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Failed(FailureKind),
}

impl TurnStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Terminal run status to persist.
    pub fn run_status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Success,
            Self::Failed(_) => RunStatus::Failed,
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Self::Completed => None,
            Self::Failed(kind) => Some(*kind),
        }
    }
}

/// Everything a turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text to show the user.
    pub reply: String,

    pub status: TurnStatus,

    /// Steps in the order they happened.
    pub steps: Vec<AgentStep>,

    /// The conversation as sent to and received from the model.
    pub messages: Vec<ChatMessage>,

    /// Completions requested.
    pub iterations: usize,
}

/// Loop state.
enum TurnState {
    AwaitingCompletion,
    DispatchingTools(Vec<ToolCallRequest>),
    Done(String),
    Error(FailureKind),
}

/// Per-turn scratch state. Each turn owns its own lists.
struct Turn {
    messages: Vec<ChatMessage>,
    steps: Vec<AgentStep>,
    iterations: usize,
}

impl Turn {
    fn record(&mut self, step: AgentStep) {
        self.steps.push(step);
    }

    /// Feed a failed call back to the model and record it as a system error.
    fn reject_call(&mut self, call: &ToolCallRequest, err: &AgentError) {
        let message = err.to_string();
        warn!(tool = %call.name, error = %message, "Rejected tool call");
        self.record(
            AgentStep::new(StepType::SystemError, json!({ "error": message })).with_tool(&call.name),
        );
        let feedback = ToolOutput::error(message).to_value();
        self.messages.push(ChatMessage::tool(&call.id, feedback.to_string()));
    }

    fn finish(self, reply: String, status: TurnStatus) -> TurnOutcome {
        TurnOutcome {
            reply,
            status,
            steps: self.steps,
            messages: self.messages,
            iterations: self.iterations,
        }
    }
}

/// Drives one turn of model completions and tool calls.
pub struct AgentRuntime {
    /// Model provider; `None` when no endpoint is configured.
    provider: Option<Arc<dyn ModelProvider>>,

    /// Tool registry.
    tools: Arc<ToolRegistry>,

    /// Runtime configuration.
    config: RuntimeConfig,
}

impl AgentRuntime {
    /// Create a new agent runtime.
    pub fn new(provider: Option<Arc<dyn ModelProvider>>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            config: RuntimeConfig::default(),
        }
    }

    /// Set the runtime configuration.
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Model name, when a provider is configured.
    pub fn model(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.model())
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn starting from `messages`.
    ///
    /// Never fails: provider errors and the iteration cap end the turn with a
    /// canned reply and a `Failed` status, and the raw error is kept in the
    /// step trace.
    pub async fn run_turn(&self, messages: Vec<ChatMessage>) -> TurnOutcome {
        let mut turn = Turn {
            messages,
            steps: Vec::new(),
            iterations: 0,
        };

        let Some(provider) = self.provider.as_deref() else {
            warn!("No model endpoint configured");
            turn.record(AgentStep::new(
                StepType::SystemError,
                json!({ "error": "missing_openai_api_key" }),
            ));
            turn.messages.push(ChatMessage::assistant(NOT_CONFIGURED_REPLY));
            return turn.finish(
                NOT_CONFIGURED_REPLY.to_string(),
                TurnStatus::Failed(FailureKind::NotConfigured),
            );
        };

        let definitions = self.tools.export_schemas();
        let mut state = TurnState::AwaitingCompletion;

        loop {
            state = match state {
                TurnState::AwaitingCompletion if turn.iterations >= self.config.max_iterations => {
                    warn!(
                        iterations = turn.iterations,
                        "Reached max iterations without a final response"
                    );
                    turn.record(AgentStep::new(
                        StepType::SystemError,
                        json!({ "error": "max_iterations_reached" }),
                    ));
                    TurnState::Error(FailureKind::IterationLimit)
                }
                TurnState::AwaitingCompletion => {
                    turn.iterations += 1;
                    debug!(iteration = turn.iterations, "Requesting completion");

                    match provider.complete(&turn.messages, &definitions).await {
                        Ok(completion) => {
                            let text = completion.reply_text().to_string();
                            turn.record(AgentStep::new(
                                StepType::AssistantMessage,
                                json!({
                                    "content": text,
                                    "toolCalls": completion.tool_calls.len(),
                                }),
                            ));
                            turn.messages.push(completion.to_message());

                            if completion.has_tool_calls() {
                                info!(count = completion.tool_calls.len(), "Model requested tool calls");
                                TurnState::DispatchingTools(completion.tool_calls)
                            } else if !text.is_empty() {
                                TurnState::Done(text)
                            } else {
                                TurnState::AwaitingCompletion
                            }
                        }
                        Err(e) => {
                            let message = format!("LLM iteration failed: {}", e);
                            error!(iteration = turn.iterations, error = %e, "LLM iteration failed");
                            turn.record(AgentStep::new(StepType::SystemError, json!({ "error": message })));
                            TurnState::Error(FailureKind::Provider)
                        }
                    }
                }
                TurnState::DispatchingTools(calls) => {
                    for call in &calls {
                        self.dispatch_call(call, &mut turn).await;
                    }
                    TurnState::AwaitingCompletion
                }
                TurnState::Done(reply) => {
                    info!(iterations = turn.iterations, steps = turn.steps.len(), "Turn completed");
                    return turn.finish(reply, TurnStatus::Completed);
                }
                TurnState::Error(kind) => {
                    return turn.finish(kind.reply().to_string(), TurnStatus::Failed(kind));
                }
            };
        }
    }

    async fn dispatch_call(&self, call: &ToolCallRequest, turn: &mut Turn) {
        let args = match parse_arguments(call) {
            Ok(args) => args,
            Err(e) => return turn.reject_call(call, &e),
        };
        let Some(tool) = self.tools.get(&call.name) else {
            return turn.reject_call(call, &AgentError::UnknownTool(call.name.clone()));
        };

        turn.record(
            AgentStep::new(StepType::ToolCall, json!({ "arguments": args })).with_tool(&call.name),
        );

        let output = match tool.execute(args).await {
            Ok(output) => output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolOutput::error(e.to_string())
            }
        };
        debug!(tool = %call.name, success = output.success, "Tool finished");

        let result = compact_tool_result(output.to_value(), self.config.result_list_cap);
        turn.record(
            AgentStep::new(
                StepType::ToolResult,
                json!({ "success": output.success, "result": result }),
            )
            .with_tool(&call.name),
        );
        turn.messages.push(ChatMessage::tool(&call.id, result.to_string()));
    }
}

/// Parse a tool call's argument string. Blank means `{}`.
fn parse_arguments(call: &ToolCallRequest) -> Result<Value, AgentError> {
    let raw = call.arguments.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(AgentError::tool_arguments(&call.name, "arguments must be a JSON object")),
        Err(e) => Err(AgentError::tool_arguments(&call.name, e.to_string())),
    }
}

/// Cap list fields under `data` so a large result cannot flood the prompt.
///
/// Arrays longer than `cap` at the top level of `data` or one object level
/// down are replaced by `{items: first cap, total}`.
pub fn compact_tool_result(mut result: Value, cap: usize) -> Value {
    let Some(data) = result.get_mut("data").and_then(Value::as_object_mut) else {
        return result;
    };
    for value in data.values_mut() {
        if let Value::Object(inner) = value {
            inner.values_mut().for_each(|v| cap_list(v, cap));
        } else {
            cap_list(value, cap);
        }
    }
    result
}

fn cap_list(value: &mut Value, cap: usize) {
    let Value::Array(items) = value else {
        return;
    };
    if items.len() <= cap {
        return;
    }
    let total = items.len();
    items.truncate(cap);
    let items = std::mem::take(items);
    *value = json!({ "items": items, "total": total });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Completion;
    use crate::tools::Tool;
    use crate::Result;
    use async_trait::async_trait;
    use gigwatch_core::ToolDefinition;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted completions in order; errors once exhausted.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<Completion>>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<Completion>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, _messages: &[ChatMessage], _tools: &[ToolDefinition]) -> Result<Completion> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AgentError::provider("script exhausted")))
        }
    }

    /// Always asks for the same tool.
    struct LoopingProvider;

    #[async_trait]
    impl ModelProvider for LoopingProvider {
        fn name(&self) -> &str {
            "looping"
        }

        fn model(&self) -> &str {
            "looping-model"
        }

        async fn complete(&self, _messages: &[ChatMessage], _tools: &[ToolDefinition]) -> Result<Completion> {
            Ok(call("c", "list_shows", "{}"))
        }
    }

    struct ListShowsTool;

    #[async_trait]
    impl Tool for ListShowsTool {
        fn name(&self) -> &str {
            "list_shows"
        }

        fn description(&self) -> &str {
            "List shows"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, args: Value) -> Result<ToolOutput> {
            if args.get("explode").is_some() {
                return Err(AgentError::tool("database locked"));
            }
            let events: Vec<Value> = (0..25).map(|i| json!({"id": i})).collect();
            Ok(ToolOutput::success(json!({
                "events": events,
                "report": {"events": events.clone(), "title": "weekly"},
                "count": 25
            })))
        }
    }

    fn call(id: &str, name: &str, args: &str) -> Completion {
        Completion::tool_calls(vec![ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments: args.into(),
        }])
    }

    fn runtime(provider: Arc<dyn ModelProvider>) -> AgentRuntime {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ListShowsTool)).unwrap();
        AgentRuntime::new(Some(provider), Arc::new(registry))
    }

    fn step_types(outcome: &TurnOutcome) -> Vec<StepType> {
        outcome.steps.iter().map(|s| s.step_type).collect()
    }

    #[tokio::test]
    async fn test_plain_reply() {
        let provider = ScriptedProvider::new(vec![Ok(Completion::text("  Hello there  "))]);
        let outcome = runtime(provider).run_turn(vec![ChatMessage::user("hi")]).await;

        assert_eq!(outcome.reply, "Hello there");
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.steps[0].payload, json!({"content": "Hello there", "toolCalls": 0}));
    }

    #[tokio::test]
    async fn test_tool_round_trip_with_compaction() {
        let provider = ScriptedProvider::new(vec![
            Ok(call("c1", "list_shows", "")),
            Ok(Completion::text("Found 25 shows.")),
        ]);
        let outcome = runtime(provider).run_turn(vec![ChatMessage::user("shows?")]).await;

        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(
            step_types(&outcome),
            vec![
                StepType::AssistantMessage,
                StepType::ToolCall,
                StepType::ToolResult,
                StepType::AssistantMessage
            ]
        );
        assert_eq!(outcome.steps[1].payload, json!({"arguments": {}}));
        assert_eq!(outcome.steps[1].tool_name.as_deref(), Some("list_shows"));

        let result = &outcome.steps[2].payload["result"];
        assert_eq!(outcome.steps[2].payload["success"], true);
        assert_eq!(result["data"]["events"]["total"], 25);
        assert_eq!(result["data"]["events"]["items"].as_array().unwrap().len(), 10);
        assert_eq!(result["data"]["report"]["events"]["total"], 25);
        assert_eq!(result["data"]["report"]["title"], "weekly");

        let tool_msg = outcome
            .messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("c1"))
            .unwrap();
        let fed_back: Value = serde_json::from_str(tool_msg.content_str()).unwrap();
        assert_eq!(&fed_back, result);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_calls_are_fed_back() {
        let provider = ScriptedProvider::new(vec![
            Ok(call("c1", "list_shows", "{not json")),
            Ok(call("c2", "drop_tables", "{}")),
            Ok(Completion::text("Sorry, fixed it.")),
        ]);
        let outcome = runtime(provider).run_turn(vec![ChatMessage::user("go")]).await;

        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(
            step_types(&outcome),
            vec![
                StepType::AssistantMessage,
                StepType::SystemError,
                StepType::AssistantMessage,
                StepType::SystemError,
                StepType::AssistantMessage
            ]
        );
        let parse_error = outcome.steps[1].payload["error"].as_str().unwrap();
        assert!(parse_error.starts_with("Tool arguments parse error:"));
        assert_eq!(outcome.steps[3].payload["error"], "Tool \"drop_tables\" not found");
        assert_eq!(outcome.steps[3].tool_name.as_deref(), Some("drop_tables"));

        let fed_back: Value = serde_json::from_str(
            outcome
                .messages
                .iter()
                .find(|m| m.tool_call_id.as_deref() == Some("c2"))
                .unwrap()
                .content_str(),
        )
        .unwrap();
        assert_eq!(fed_back, json!({"success": false, "error": "Tool \"drop_tables\" not found"}));
    }

    #[tokio::test]
    async fn test_tool_error_becomes_failed_result() {
        let provider = ScriptedProvider::new(vec![
            Ok(call("c1", "list_shows", "{\"explode\": true}")),
            Ok(Completion::text("The database is busy.")),
        ]);
        let outcome = runtime(provider).run_turn(vec![ChatMessage::user("go")]).await;

        assert_eq!(outcome.status, TurnStatus::Completed);
        let result = &outcome.steps[2];
        assert_eq!(result.step_type, StepType::ToolResult);
        assert_eq!(result.payload["success"], false);
        assert_eq!(
            result.payload["result"]["error"],
            "Tool execution failed: database locked"
        );
    }

    #[tokio::test]
    async fn test_empty_reply_loops_again() {
        let provider = ScriptedProvider::new(vec![
            Ok(Completion::text("   ")),
            Ok(Completion::text("second try")),
        ]);
        let outcome = runtime(provider).run_turn(vec![ChatMessage::user("hi")]).await;
        assert_eq!(outcome.reply, "second try");
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn test_provider_failure_is_canned() {
        let provider = ScriptedProvider::new(vec![Err(AgentError::provider("connection refused"))]);
        let outcome = runtime(provider).run_turn(vec![ChatMessage::user("hi")]).await;

        assert_eq!(outcome.status, TurnStatus::Failed(FailureKind::Provider));
        assert_eq!(outcome.reply, FAILURE_REPLY);
        assert!(!outcome.reply.contains("connection refused"));
        let error = outcome.steps[0].payload["error"].as_str().unwrap();
        assert!(error.starts_with("LLM iteration failed:"));
        assert!(error.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let runtime = runtime(Arc::new(LoopingProvider)).with_config(RuntimeConfig {
            max_iterations: 3,
            result_list_cap: 10,
        });
        let outcome = runtime.run_turn(vec![ChatMessage::user("loop")]).await;

        assert_eq!(outcome.status, TurnStatus::Failed(FailureKind::IterationLimit));
        assert_eq!(outcome.reply, INCOMPLETE_REPLY);
        assert_eq!(outcome.iterations, 3);
        // 3 x (assistant_message, tool_call, tool_result) + cap marker
        assert_eq!(outcome.steps.len(), 10);
        let last = outcome.steps.last().unwrap();
        assert_eq!(last.step_type, StepType::SystemError);
        assert_eq!(last.payload["error"], "max_iterations_reached");
    }

    #[tokio::test]
    async fn test_not_configured() {
        let runtime = AgentRuntime::new(None, Arc::new(ToolRegistry::new()));
        assert_eq!(runtime.model(), None);

        let outcome = runtime.run_turn(vec![ChatMessage::user("hi")]).await;
        assert_eq!(outcome.status, TurnStatus::Failed(FailureKind::NotConfigured));
        assert_eq!(outcome.reply, NOT_CONFIGURED_REPLY);
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].payload["error"], "missing_openai_api_key");
        assert_eq!(outcome.status.run_status(), RunStatus::Failed);
    }

    #[test]
    fn test_compaction_leaves_short_lists_alone() {
        let value = json!({"success": true, "data": {"args": ["-n", "x"], "nested": {"ids": [1, 2, 3]}}});
        assert_eq!(compact_tool_result(value.clone(), 10), value);

        let no_data = json!({"success": false, "error": "x"});
        assert_eq!(compact_tool_result(no_data.clone(), 10), no_data);

        let deep = json!({"data": {"a": {"b": {"c": [1, 2, 3]}}}});
        assert_eq!(compact_tool_result(deep.clone(), 1), deep);
    }

    #[test]
    fn test_parse_arguments() {
        let mk = |args: &str| ToolCallRequest {
            id: "c".into(),
            name: "t".into(),
            arguments: args.into(),
        };
        assert_eq!(parse_arguments(&mk("  ")).unwrap(), json!({}));
        assert_eq!(parse_arguments(&mk("{\"a\":1}")).unwrap(), json!({"a": 1}));
        assert!(matches!(parse_arguments(&mk("[1]")), Err(AgentError::ToolArguments { .. })));
        assert!(matches!(parse_arguments(&mk("{")), Err(AgentError::ToolArguments { .. })));
    }
}

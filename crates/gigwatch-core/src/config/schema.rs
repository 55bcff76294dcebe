//! Configuration schema definitions.

use crate::model::DEFAULT_TEMPERATURE;
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main GigWatch configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model endpoint settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop settings.
    #[serde(default)]
    pub agent: AgentSettings,

    /// Prompt budgeting and compaction.
    #[serde(default)]
    pub context: ContextConfig,

    /// Command execution and file access.
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Persistence.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Inbound channel handling.
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// OpenAI-compatible model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key. The agent answers with a canned reply when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "kimi-k2-turbo-preview".to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ModelConfig {
    /// The API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref().filter(|k| !k.is_blank())
    }
}

/// Tool-calling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Completion requests allowed per turn.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// List fields in tool results are cut to this many items.
    #[serde(default = "default_result_list_cap")]
    pub result_list_cap: usize,

    /// Serialized step payloads above this many chars are replaced by a preview.
    #[serde(default = "default_step_payload_limit")]
    pub step_payload_limit: usize,

    /// Replaces the built-in system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> usize {
    50
}

fn default_result_list_cap() -> usize {
    10
}

fn default_step_payload_limit() -> usize {
    6000
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            result_list_cap: default_result_list_cap(),
            step_payload_limit: default_step_payload_limit(),
            system_prompt: None,
        }
    }
}

/// Prompt budgeting and history compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Summary row the conversation compacts into.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Share of the context window reserved for the prompt.
    #[serde(default = "default_budget_ratio")]
    pub budget_ratio: f64,

    /// Window for models missing from the table.
    #[serde(default = "default_window")]
    pub default_window: usize,

    /// Most recent messages considered when packing a prompt.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// Newest pending messages never folded into the summary.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Foldable messages required before compaction runs.
    #[serde(default = "default_min_summarize")]
    pub min_summarize: usize,

    /// Messages folded per compaction pass.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// Summary length cap in characters.
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Extra or overriding model windows, keyed by model name.
    #[serde(default)]
    pub extra_windows: HashMap<String, usize>,
}

fn default_scope() -> String {
    "global".to_string()
}

fn default_budget_ratio() -> f64 {
    0.72
}

fn default_window() -> usize {
    crate::context::DEFAULT_CONTEXT_WINDOW
}

fn default_fetch_limit() -> usize {
    240
}

fn default_keep_recent() -> usize {
    10
}

fn default_min_summarize() -> usize {
    20
}

fn default_max_batch() -> usize {
    120
}

fn default_summary_max_chars() -> usize {
    4000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            budget_ratio: default_budget_ratio(),
            default_window: default_window(),
            fetch_limit: default_fetch_limit(),
            keep_recent: default_keep_recent(),
            min_summarize: default_min_summarize(),
            max_batch: default_max_batch(),
            summary_max_chars: default_summary_max_chars(),
            extra_windows: HashMap::new(),
        }
    }
}

/// Command execution and file access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Root for `bash_exec`. Defaults to the process working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,

    /// Commands allowed in addition to the built-in list.
    #[serde(default)]
    pub extra_allowed_commands: Vec<String>,

    /// Directories `read_file` may read from.
    #[serde(default)]
    pub read_roots: Vec<PathBuf>,

    /// Largest file `read_file` returns.
    #[serde(default = "default_read_max_bytes")]
    pub read_max_bytes: u64,
}

fn default_read_max_bytes() -> u64 {
    200_000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workdir: None,
            extra_allowed_commands: Vec::new(),
            read_roots: Vec::new(),
            read_max_bytes: default_read_max_bytes(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/gigwatch.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Inbound channel handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// How long a delivered event id is remembered.
    #[serde(default = "default_dedup_ttl")]
    pub dedup_ttl_secs: u64,

    /// Event ids remembered per poller.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// When set, events from other chats are ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_chat_id: Option<String>,
}

fn default_dedup_ttl() -> u64 {
    6 * 60 * 60
}

fn default_dedup_capacity() -> usize {
    5000
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_secs: default_dedup_ttl(),
            dedup_capacity: default_dedup_capacity(),
            allowed_chat_id: None,
        }
    }
}

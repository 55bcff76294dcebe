//! Tool contract, registry, and built-in tools.
//!
//! This module provides:
//! - [`Tool`] trait for implementing tools
//! - [`ToolRegistry`] for the tools available to the model
//! - [`BashExecTool`] and [`ReadFileTool`], the built-in capabilities

mod exec;
mod read_file;

pub use exec::BashExecTool;
pub use read_file::ReadFileTool;

use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use gigwatch_core::{Config, ToolDefinition, ToolOutput};
use gigwatch_sandbox::{CommandPolicy, SandboxedExecutor};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A capability the model can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Get the tool definition for the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }

    /// Execute the tool with parsed arguments.
    ///
    /// Expected failures should come back as `ToolOutput { success: false }`.
    /// An `Err` is also captured by the runtime as a failed result.
    async fn execute(&self, args: Value) -> Result<ToolOutput>;
}

/// Registry for available tools.
///
/// Populated once at startup and then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct ToolRegistry {
    /// Tools in registration order.
    tools: Vec<Arc<dyn Tool>>,

    /// Name to position in `tools`.
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in tools configured by `config`.
    pub fn with_defaults(config: &Config) -> Result<Self> {
        let root = match &config.sandbox.workdir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        let policy = CommandPolicy::new().allow_all(config.sandbox.extra_allowed_commands.iter().cloned());
        let executor = SandboxedExecutor::new(root).with_policy(policy);

        let mut registry = Self::new();
        registry.register(Arc::new(BashExecTool::new(executor)))?;
        registry.register(Arc::new(
            ReadFileTool::new(config.sandbox.read_roots.iter().cloned())
                .with_max_bytes(config.sandbox.read_max_bytes),
        ))?;
        Ok(registry)
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }

        debug!(tool = %name, "Registered tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tool names in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Definitions of every tool, in registration order.
    pub fn export_schemas(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Definitions wrapped in the chat-completions `function` envelope.
    pub fn function_schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| t.definition().to_function_schema())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Read an optional numeric argument, accepting integers and floats.
///
/// Non-finite or negative values are treated as absent.
pub(crate) fn number_arg(args: &Value, key: &str) -> Option<u64> {
    args.get(key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.floor() as u64)
}

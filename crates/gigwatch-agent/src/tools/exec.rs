//! The `bash_exec` tool.

use super::{number_arg, Tool};
use crate::Result;
use async_trait::async_trait;
use gigwatch_core::ToolOutput;
use gigwatch_sandbox::{ExecOutput, ExecRequest, SandboxedExecutor};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Runs allow-listed commands through a [`SandboxedExecutor`].
///
/// Arguments are `command`, `args`, `timeoutMs`, and `maxOutputChars`.
/// Output is always `{success, data?, error?}`: rejections carry no data,
/// process failures carry whatever was captured.
pub struct BashExecTool {
    executor: SandboxedExecutor,
}

impl BashExecTool {
    pub fn new(executor: SandboxedExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &SandboxedExecutor {
        &self.executor
    }

    /// Build a typed request from loose model arguments.
    ///
    /// A missing command becomes an empty one so the executor reports it.
    /// Non-array `args` are ignored and non-string items are stringified.
    fn parse_request(args: &Value) -> ExecRequest {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let argv: Vec<String> = match args.get("args") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };

        let mut request = ExecRequest::new(command).args(argv);
        if let Some(ms) = number_arg(args, "timeoutMs") {
            request = request.with_timeout_ms(ms);
        }
        if let Some(chars) = number_arg(args, "maxOutputChars") {
            request = request.with_max_output_chars(chars as usize);
        }
        request
    }
}

fn output_data(output: &ExecOutput) -> Value {
    json!({
        "command": output.command,
        "args": output.args,
        "cwd": output.cwd.to_string_lossy(),
        "exitCode": output.exit_code,
        "stdout": output.stdout,
        "stderr": output.stderr,
        "stdoutTruncated": output.stdout_truncated,
        "stderrTruncated": output.stderr_truncated,
        "durationMs": output.duration_ms,
    })
}

#[async_trait]
impl Tool for BashExecTool {
    fn name(&self) -> &str {
        "bash_exec"
    }

    fn description(&self) -> &str {
        "Run a restricted command inside the project directory (command + args only, no shell scripts)."
    }

    fn parameters(&self) -> Value {
        let limits = self.executor.limits();
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command name (native Unix commands only), e.g. find, grep, ls, cat"
                },
                "args": {
                    "type": "array",
                    "description": "Argument vector, e.g. [\"-n\", \"TODO\", \"src\"]",
                    "items": { "type": "string" }
                },
                "timeoutMs": {
                    "type": "number",
                    "description": format!(
                        "Timeout in milliseconds, default {}, max {}",
                        limits.default_timeout_ms, limits.max_timeout_ms
                    ),
                    "default": limits.default_timeout_ms
                },
                "maxOutputChars": {
                    "type": "number",
                    "description": format!(
                        "Max characters returned per stream, default {}, max {}",
                        limits.default_output_chars, limits.max_output_chars
                    ),
                    "default": limits.default_output_chars
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let request = Self::parse_request(&args);

        match self.executor.execute(request).await {
            Ok(output) => {
                debug!(
                    command = %output.command,
                    duration_ms = output.duration_ms,
                    "bash_exec finished"
                );
                Ok(ToolOutput::success(output_data(&output)))
            }
            Err(failure) => {
                let category = failure.error.category();
                warn!(error = %failure.error, category = ?category, "bash_exec failed");
                let mut result = ToolOutput::error(failure.error.to_string());
                if let Some(output) = &failure.output {
                    result = result.with_data(output_data(output));
                }
                Ok(result)
            }
        }
    }
}

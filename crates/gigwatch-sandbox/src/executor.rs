//! Command execution within the working root.

use crate::error::SandboxError;
use crate::limits::ExecLimits;
use crate::policy::CommandPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Safe PATH used when the parent environment has none.
pub const SAFE_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Variables inherited from the parent environment.
const INHERITED_ENV: &[&str] = &["PATH", "HOME", "USER", "LANG", "LC_ALL", "TZ", "TERM"];

/// How long to wait for pipe readers once the process is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

const READ_CHUNK: usize = 8 * 1024;

/// A command invocation requested by the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_chars: Option<usize>,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn with_max_output_chars(mut self, chars: usize) -> Self {
        self.max_output_chars = Some(chars);
        self
    }
}

/// Captured result of a process that was started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecOutput {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// `None` when the process was killed or ended by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration_ms: u64,
    #[serde(skip)]
    pub pid: Option<u32>,
}

impl ExecOutput {
    fn empty(command: &str, args: &[String], cwd: &Path) -> Self {
        Self {
            command: command.to_string(),
            args: args.to_vec(),
            cwd: cwd.to_path_buf(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            duration_ms: 0,
            pid: None,
        }
    }
}

/// A rejected or failed execution.
///
/// Validation failures carry no output. Process-level failures (spawn,
/// timeout, non-zero exit) carry whatever was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecFailure {
    pub error: SandboxError,
    pub output: Option<ExecOutput>,
}

impl ExecFailure {
    fn rejected(error: SandboxError) -> Self {
        Self { error, output: None }
    }

    fn with_output(error: SandboxError, output: ExecOutput) -> Self {
        Self {
            error,
            output: Some(output),
        }
    }
}

impl std::fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ExecFailure {}

impl From<SandboxError> for ExecFailure {
    fn from(error: SandboxError) -> Self {
        Self::rejected(error)
    }
}

/// How the wait on the child resolved.
enum Completion {
    Exited(ExitStatus),
    TimedOut,
    WaitFailed(std::io::Error),
}

#[derive(Default)]
struct Capture {
    bytes: Vec<u8>,
    overflowed: bool,
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Executes allow-listed commands inside a fixed working root.
#[derive(Debug, Clone)]
pub struct SandboxedExecutor {
    root: PathBuf,
    policy: CommandPolicy,
    limits: ExecLimits,
    env: HashMap<String, String>,
}

impl SandboxedExecutor {
    /// Create an executor rooted at `root`, inheriting a minimal environment.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut env: HashMap<String, String> = INHERITED_ENV
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        env.entry("PATH".to_string())
            .or_insert_with(|| SAFE_PATH.to_string());

        Self {
            root: root.into(),
            policy: CommandPolicy::default(),
            limits: ExecLimits::default(),
            env,
        }
    }

    /// Set the command policy.
    pub fn with_policy(mut self, policy: CommandPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the time and output limits.
    pub fn with_limits(mut self, limits: ExecLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set an environment variable for spawned commands.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &CommandPolicy {
        &self.policy
    }

    pub fn limits(&self) -> &ExecLimits {
        &self.limits
    }

    /// Run every validation stage without executing anything.
    pub fn validate(&self, request: &ExecRequest) -> crate::Result<String> {
        let command = self.policy.check_command(&request.command)?;
        self.policy.check_args(command, &request.args)?;
        Ok(command.to_string())
    }

    /// Validate and run a command.
    ///
    /// Exit code 0 is `Ok`. Anything else, including a non-zero exit, is an
    /// `ExecFailure` carrying the captured output.
    pub async fn execute(&self, request: ExecRequest) -> Result<ExecOutput, ExecFailure> {
        let command = self.validate(&request)?;
        let timeout_ms = self.limits.timeout_ms(request.timeout_ms);
        let max_chars = self.limits.output_chars(request.max_output_chars);
        let args = request.args;

        debug!(command = %command, args = ?args, timeout_ms, "Executing command");

        let start = Instant::now();
        let mut output = ExecOutput::empty(&command, &args, &self.root);

        let mut child = match Command::new(&command)
            .args(&args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(&self.env)
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to spawn command");
                output.duration_ms = start.elapsed().as_millis() as u64;
                return Err(ExecFailure::with_output(
                    SandboxError::Spawn(e.to_string()),
                    output,
                ));
            }
        };
        output.pid = child.id();

        // A char is at most 4 bytes, so this always holds max_chars chars
        let byte_cap = max_chars.saturating_mul(4).saturating_add(4);
        let stdout = Arc::new(Mutex::new(Capture::default()));
        let stderr = Arc::new(Mutex::new(Capture::default()));
        let readers = [
            tokio::spawn(drain(child.stdout.take(), stdout.clone(), byte_cap)),
            tokio::spawn(drain(child.stderr.take(), stderr.clone(), byte_cap)),
        ];

        let completion = {
            let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => Completion::Exited(status),
                    Err(e) => Completion::WaitFailed(e),
                },
                _ = deadline => Completion::TimedOut,
            }
            // deadline is dropped here on every branch
        };

        if matches!(completion, Completion::TimedOut | Completion::WaitFailed(_)) {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "Kill after timeout failed; process already exited");
            }
            // Reap so the process is gone before we return
            if let Err(e) = child.wait().await {
                warn!(error = %e, "Failed to reap killed command");
            }
        }

        // Descendants may still hold the pipes open; do not wait on them forever
        for reader in readers {
            let abort = reader.abort_handle();
            if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
                abort.abort();
            }
        }

        (output.stdout, output.stdout_truncated) = finish_capture(&stdout, max_chars).await;
        (output.stderr, output.stderr_truncated) = finish_capture(&stderr, max_chars).await;
        output.duration_ms = start.elapsed().as_millis() as u64;

        match completion {
            Completion::TimedOut => {
                warn!(command = %command, timeout_ms, "Command timed out and was killed");
                Err(ExecFailure::with_output(SandboxError::Timeout(timeout_ms), output))
            }
            Completion::WaitFailed(e) => Err(ExecFailure::with_output(
                SandboxError::Io(e.to_string()),
                output,
            )),
            Completion::Exited(status) => {
                output.exit_code = status.code();
                match status.code() {
                    Some(0) => Ok(output),
                    Some(code) => Err(ExecFailure::with_output(SandboxError::NonZeroExit(code), output)),
                    None => Err(ExecFailure::with_output(
                        SandboxError::Signal(exit_signal(&status)),
                        output,
                    )),
                }
            }
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> i32 {
    -1
}

/// Read a stream to EOF, keeping at most `cap` bytes.
///
/// Reading continues past the cap so the child never blocks on a full pipe.
async fn drain(stream: Option<impl AsyncRead + Unpin>, capture: SharedCapture, cap: usize) {
    let Some(mut stream) = stream else {
        return;
    };
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let mut capture = capture.lock().await;
                let room = cap.saturating_sub(capture.bytes.len());
                if n > room {
                    capture.overflowed = true;
                }
                let take = n.min(room);
                capture.bytes.extend_from_slice(&buf[..take]);
            }
            Err(e) => {
                warn!("Error reading command output: {}", e);
                break;
            }
        }
    }
}

/// Decode captured bytes and cut them to `max_chars` characters.
async fn finish_capture(capture: &SharedCapture, max_chars: usize) -> (String, bool) {
    let capture = capture.lock().await;
    let text = String::from_utf8_lossy(&capture.bytes);
    truncate_chars(&text, max_chars, capture.overflowed)
}

fn truncate_chars(text: &str, max_chars: usize, already_truncated: bool) -> (String, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), already_truncated),
    }
}

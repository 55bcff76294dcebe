//! Command and argument policy.
//!
//! Validation runs as a chain of short-circuiting checks: command name
//! charset, denylist, allow-list, control characters, workspace
//! containment of every path-shaped argument or flag value, and finally
//! the per-command hooks that could start another program.

use crate::error::SandboxError;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Component, Path};

/// Interpreters, remote access, and privilege escalation.
pub const BLOCKED_COMMANDS: &[&str] = &[
    "bash", "sh", "zsh", "fish", "python", "python3", "node", "bun", "perl", "ruby", "pwsh",
    "powershell", "sudo", "ssh", "scp", "rsync",
];

/// Native Unix commands available by default.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "awk", "basename", "cat", "cp", "cut", "date", "dirname", "echo", "env", "find", "git", "grep",
    "head", "id", "ls", "mkdir", "mv", "paste", "pwd", "realpath", "rm", "sed", "sort", "stat",
    "tail", "touch", "tr", "uname", "uniq", "wc", "whoami", "xargs",
];

/// Allowed commands whose operands name another program to run.
const LAUNCHERS: &[&str] = &["env", "xargs"];

/// `find` actions that execute a program per match.
const FIND_EXEC_ACTIONS: &[&str] = &["-exec", "-execdir", "-ok", "-okdir"];

// Options that consume the following argument, so it is not the launched command
const ENV_VALUE_OPTIONS: &[&str] = &["-u", "--unset", "-C", "--chdir"];
const XARGS_VALUE_OPTIONS: &[&str] = &["-a", "-d", "-E", "-I", "-L", "-n", "-P", "-s"];
const AWK_VALUE_OPTIONS: &[&str] = &["-F", "-v"];
const SED_VALUE_OPTIONS: &[&str] = &["-l"];

// No whitespace or shell metacharacters can appear in a valid name
static COMMAND_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").ok());

// awk built-ins that spawn a process or read from one
static AWK_EXEC: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"\bsystem\s*\(|\bgetline\b|\|&|\bprintf?\b[^;{}]*\|"#).ok()
});

// GNU sed `e` command or `s///e` flag
static SED_EXEC: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?:^|[;{}!/\s\d$gpiImM])e(?:$|[\s;}])").ok());

fn pattern_matches(pattern: &Lazy<Option<Regex>>, text: &str) -> bool {
    // A pattern that failed to compile rejects everything
    pattern.as_ref().map_or(true, |re| re.is_match(text))
}

fn is_valid_command_name(command: &str) -> bool {
    match COMMAND_NAME.as_ref() {
        Some(re) => re.is_match(command),
        None => false,
    }
}

/// The part of a flag that may carry a path: `--opt=<value>` or `-X<value>`.
fn flag_value(arg: &str) -> Option<&str> {
    if let Some(long) = arg.strip_prefix("--") {
        return long.split_once('=').map(|(_, value)| value);
    }
    let short = arg.strip_prefix('-')?;
    let mut chars = short.chars();
    chars.next()?;
    let rest = chars.as_str();
    (!rest.is_empty()).then_some(rest)
}

fn has_control_chars(arg: &str) -> bool {
    arg.chars().any(|c| matches!(c, '\r' | '\n' | '\t' | '\0'))
}

/// Whether an argument looks like a filesystem path.
///
/// Flags are never paths; `.`/`..`, anything with a slash, and dotfiles are.
pub fn is_path_like(arg: &str) -> bool {
    if arg.is_empty() || arg.starts_with('-') {
        return false;
    }
    arg == "." || arg == ".." || arg.contains('/') || arg.starts_with('.')
}

/// Lexically check that `arg`, joined onto a root, stays at or under it.
fn stays_within_root(arg: &str) -> bool {
    let mut depth = 0usize;
    for component in Path::new(arg).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Allow/deny lists for executable commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    allowed: BTreeSet<String>,
    blocked: BTreeSet<String>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            allowed: DEFAULT_ALLOWED_COMMANDS.iter().map(|c| c.to_string()).collect(),
            blocked: BLOCKED_COMMANDS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl CommandPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow an additional command. The denylist still takes precedence.
    pub fn allow(mut self, command: impl Into<String>) -> Self {
        self.allowed.insert(command.into());
        self
    }

    /// Allow several additional commands.
    pub fn allow_all<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        self.allowed.contains(command) && !self.blocked.contains(command)
    }

    pub fn allowed_commands(&self) -> impl Iterator<Item = &str> {
        self.allowed
            .iter()
            .filter(|c| !self.blocked.contains(*c))
            .map(String::as_str)
    }

    /// Validate a command name. Returns the trimmed name.
    pub fn check_command<'a>(&self, command: &'a str) -> Result<&'a str> {
        let command = command.trim();
        if command.is_empty() {
            return Err(SandboxError::MissingCommand);
        }
        if !is_valid_command_name(command) {
            return Err(SandboxError::InvalidCommandName);
        }
        if self.blocked.contains(command) {
            return Err(SandboxError::Blocked(command.to_string()));
        }
        if !self.allowed.contains(command) {
            return Err(SandboxError::NotAllowed(command.to_string()));
        }
        Ok(command)
    }

    /// Validate the arguments of an already checked `command`: control
    /// characters first, then containment, then exec hooks.
    pub fn check_args(&self, command: &str, args: &[String]) -> Result<()> {
        if args.iter().any(|arg| has_control_chars(arg)) {
            return Err(SandboxError::ControlCharacters);
        }

        for arg in args {
            let candidate = if arg.starts_with('-') {
                match flag_value(arg) {
                    Some(value) => value,
                    None => continue,
                }
            } else {
                arg.as_str()
            };
            if !is_path_like(candidate) {
                continue;
            }
            if Path::new(candidate).is_absolute() {
                return Err(SandboxError::AbsolutePath(arg.clone()));
            }
            if !stays_within_root(candidate) {
                return Err(SandboxError::PathOutsideWorkspace(arg.clone()));
            }
        }

        self.check_exec_hooks(command, args)
    }

    fn check_exec_hooks(&self, command: &str, args: &[String]) -> Result<()> {
        match command {
            launcher if LAUNCHERS.contains(&launcher) => self.check_launched(launcher, args),
            "find" => match args.iter().find(|arg| FIND_EXEC_ACTIONS.contains(&arg.as_str())) {
                Some(action) => Err(SandboxError::UnsafeArgument(action.clone())),
                None => Ok(()),
            },
            "awk" => reject_matching(&AWK_EXEC, program_texts(args, AWK_VALUE_OPTIONS, &[])?),
            "sed" => reject_matching(
                &SED_EXEC,
                program_texts(args, SED_VALUE_OPTIONS, &["-e", "--expression"])?,
            ),
            _ => Ok(()),
        }
    }

    /// The program a launcher starts must itself pass the command checks,
    /// recursively, with its own arguments.
    fn check_launched(&self, launcher: &str, args: &[String]) -> Result<()> {
        if let Some(blocked) = args.iter().find(|arg| self.blocked.contains(arg.as_str())) {
            return Err(SandboxError::Blocked(blocked.clone()));
        }

        let is_env = launcher == "env";
        let value_options = if is_env { ENV_VALUE_OPTIONS } else { XARGS_VALUE_OPTIONS };

        let mut iter = args.iter().enumerate();
        while let Some((idx, arg)) = iter.next() {
            if is_env && splits_string(arg) {
                return Err(SandboxError::UnsafeArgument(arg.clone()));
            }
            if arg.starts_with('-') {
                if value_options.contains(&arg.as_str()) {
                    iter.next();
                }
                continue;
            }
            if is_env && arg.contains('=') {
                if redirects_lookup(arg) {
                    return Err(SandboxError::UnsafeArgument(arg.clone()));
                }
                continue;
            }

            let launched = self.check_command(arg)?;
            return self.check_exec_hooks(launched, &args[idx + 1..]);
        }
        Ok(())
    }
}

/// `env -S` re-splits a string into a new command line.
fn splits_string(arg: &str) -> bool {
    arg.starts_with("--split-string")
        || (arg.starts_with('-') && !arg.starts_with("--") && arg.contains('S'))
}

/// Assignments that change which binary or library gets loaded.
fn redirects_lookup(assignment: &str) -> bool {
    let key = assignment.split('=').next().unwrap_or_default();
    key == "PATH" || key.starts_with("LD_") || key.starts_with("DYLD_")
}

/// Script texts passed to awk or sed.
///
/// Explicit script options win; otherwise the first operand is the script.
/// Script files cannot be inspected, so they are refused.
fn program_texts<'a>(
    args: &'a [String],
    value_options: &[&str],
    script_options: &[&str],
) -> Result<Vec<&'a str>> {
    let mut explicit = Vec::new();
    let mut first_operand = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let arg = arg.as_str();
        if arg.starts_with("-f") || arg.starts_with("--file") {
            return Err(SandboxError::UnsafeArgument(arg.to_string()));
        }
        if script_options.contains(&arg) {
            if let Some(script) = iter.next() {
                explicit.push(script.as_str());
            }
            continue;
        }
        if let Some(script) = script_options
            .iter()
            .find_map(|opt| arg.strip_prefix(opt).filter(|rest| !rest.is_empty()))
        {
            explicit.push(script.strip_prefix('=').unwrap_or(script));
            continue;
        }
        if value_options.contains(&arg) {
            iter.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        if first_operand.is_none() {
            first_operand = Some(arg);
        }
    }

    if explicit.is_empty() {
        return Ok(first_operand.into_iter().collect());
    }
    Ok(explicit)
}

fn reject_matching(pattern: &Lazy<Option<Regex>>, scripts: Vec<&str>) -> Result<()> {
    match scripts.into_iter().find(|script| pattern_matches(pattern, script)) {
        Some(script) => Err(SandboxError::UnsafeArgument(script.to_string())),
        None => Ok(()),
    }
}

//! Sandbox error types.

use thiserror::Error;

/// Errors that can occur while validating or running a command.
///
/// Display strings are fed back to the model verbatim, so they stay short
/// and actionable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("command is required")]
    MissingCommand,

    #[error("invalid command name")]
    InvalidCommandName,

    #[error("command \"{0}\" is blocked")]
    Blocked(String),

    #[error("command \"{0}\" is not allowed. Only native Unix commands are supported by bash_exec.")]
    NotAllowed(String),

    #[error("argument \"{0}\" would run another program")]
    UnsafeArgument(String),

    #[error("args contain control characters")]
    ControlCharacters,

    #[error("path arg is outside workspace: {0}")]
    AbsolutePath(String),

    #[error("path arg is outside workspace: {0}")]
    PathOutsideWorkspace(String),

    #[error("command timed out after {0}ms")]
    Timeout(u64),

    #[error("failed to start command: {0}")]
    Spawn(String),

    #[error("command exited with code {0}")]
    NonZeroExit(i32),

    #[error("command killed by signal {0}")]
    Signal(i32),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Coarse grouping of [`SandboxError`] for logging and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed request.
    Validation,
    /// Command rejected by the allow/deny lists.
    Policy,
    /// Argument would escape the working root.
    Containment,
    /// Process-level failure after validation passed.
    Execution,
}

impl SandboxError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingCommand | Self::InvalidCommandName | Self::ControlCharacters => {
                ErrorCategory::Validation
            }
            Self::Blocked(_) | Self::NotAllowed(_) | Self::UnsafeArgument(_) => ErrorCategory::Policy,
            Self::AbsolutePath(_) | Self::PathOutsideWorkspace(_) => ErrorCategory::Containment,
            Self::Timeout(_) | Self::Spawn(_) | Self::NonZeroExit(_) | Self::Signal(_) | Self::Io(_) => {
                ErrorCategory::Execution
            }
        }
    }

    /// True when the command was refused before anything ran.
    pub fn is_rejection(&self) -> bool {
        self.category() != ErrorCategory::Execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(SandboxError::Blocked("bash".into()).to_string(), "command \"bash\" is blocked");
        assert_eq!(
            SandboxError::PathOutsideWorkspace("../x".into()).to_string(),
            "path arg is outside workspace: ../x"
        );
        assert_eq!(SandboxError::Timeout(500).to_string(), "command timed out after 500ms");
    }

    #[test]
    fn test_categories() {
        assert!(SandboxError::ControlCharacters.is_rejection());
        assert_eq!(SandboxError::UnsafeArgument("-exec".into()).category(), ErrorCategory::Policy);
        assert_eq!(SandboxError::AbsolutePath("/".into()).category(), ErrorCategory::Containment);
        assert!(!SandboxError::NonZeroExit(2).is_rejection());
    }
}

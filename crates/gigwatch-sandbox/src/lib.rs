//! Constrained command execution for GigWatch agents.
//!
//! Commands run directly from an argument vector (never through a shell),
//! inside a fixed working root, with:
//! - a default-deny command allow-list plus an explicit denylist
//! - control-character and workspace-containment checks on arguments
//! - clamped wall-clock timeouts and per-stream output caps

pub mod error;
pub mod executor;
pub mod limits;
pub mod policy;

pub use error::{ErrorCategory, SandboxError};
pub use executor::{ExecFailure, ExecOutput, ExecRequest, SandboxedExecutor};
pub use limits::ExecLimits;
pub use policy::CommandPolicy;

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;

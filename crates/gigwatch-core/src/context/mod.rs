//! Prompt budgeting primitives: token estimation and context windows.

mod tokens;
mod windows;

pub use tokens::estimate_tokens;
pub use windows::{ContextWindows, DEFAULT_CONTEXT_WINDOW};

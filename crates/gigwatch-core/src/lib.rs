//! # gigwatch-core
//!
//! Core types, configuration, and utilities for GigWatch.
//!
//! This crate provides shared functionality used across all GigWatch crates:
//!
//! - **Configuration**: Loading, validation, and environment overrides
//! - **Types**: Messages, agent runs and steps, tool contracts, prompt messages
//! - **Context**: Token estimation and model context-window resolution

pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod model;
pub mod secret;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use secret::SecretString;
pub use types::*;

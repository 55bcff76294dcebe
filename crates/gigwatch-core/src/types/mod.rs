//! Core types for GigWatch.

mod message;
mod prompt;
mod run;
mod tool;

pub use message::*;
pub use prompt::*;
pub use run::*;
pub use tool::*;

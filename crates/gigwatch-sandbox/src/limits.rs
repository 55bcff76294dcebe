//! Time and output limits for executed commands.

use serde::{Deserialize, Serialize};

/// Bounds applied to every execution request.
///
/// Requested values are clamped into `[min, max]`; missing values use the
/// default. Callers cannot opt out of clamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecLimits {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "min_timeout_ms")]
    pub min_timeout_ms: u64,

    #[serde(default = "max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Per-stream cap on returned characters.
    #[serde(default = "default_output_chars")]
    pub default_output_chars: usize,

    #[serde(default = "min_output_chars")]
    pub min_output_chars: usize,

    #[serde(default = "max_output_chars")]
    pub max_output_chars: usize,
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn min_timeout_ms() -> u64 {
    500
}

fn max_timeout_ms() -> u64 {
    60_000
}

fn default_output_chars() -> usize {
    8_000
}

fn min_output_chars() -> usize {
    500
}

fn max_output_chars() -> usize {
    20_000
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            min_timeout_ms: min_timeout_ms(),
            max_timeout_ms: max_timeout_ms(),
            default_output_chars: default_output_chars(),
            min_output_chars: min_output_chars(),
            max_output_chars: max_output_chars(),
        }
    }
}

impl ExecLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style method to set the timeout bounds.
    pub fn with_timeout_bounds(mut self, min_ms: u64, default_ms: u64, max_ms: u64) -> Self {
        self.min_timeout_ms = min_ms;
        self.default_timeout_ms = default_ms;
        self.max_timeout_ms = max_ms;
        self
    }

    /// Clamp a requested timeout in milliseconds.
    pub fn timeout_ms(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_timeout_ms)
            .clamp(self.min_timeout_ms, self.max_timeout_ms.max(self.min_timeout_ms))
    }

    /// Clamp a requested per-stream output cap.
    pub fn output_chars(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_output_chars)
            .clamp(self.min_output_chars, self.max_output_chars.max(self.min_output_chars))
    }
}

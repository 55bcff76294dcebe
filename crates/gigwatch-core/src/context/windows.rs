//! Model name to context-window resolution.

use std::collections::BTreeMap;

/// Window assumed for models the table does not know.
pub const DEFAULT_CONTEXT_WINDOW: usize = 16 * 1024;

const K: usize = 1024;

const BUILTIN_WINDOWS: &[(&str, usize)] = &[
    ("kimi-k2.5", 32 * K),
    // DeepSeek
    ("deepseek-chat", 128 * K),
    ("deepseek-reasoner", 128 * K),
    // MiniMax
    ("minimax-m2.5", 200 * K),
    ("minimax-m2.5-highspeed", 200 * K),
    ("minimax-m2.1", 200 * K),
    ("minimax-m2.1-highspeed", 200 * K),
    ("minimax-m2.1-lightning", 200 * K),
    ("minimax-m2", 200 * K),
    // GLM
    ("glm-5", 200 * K),
    ("glm-4.7", 200 * K),
    ("glm-4.7-flash", 200 * K),
    ("glm-4.7-flashx", 200 * K),
    ("glm-4.6", 200 * K),
    ("glm-4.5", 128 * K),
    ("glm-4.5-air", 128 * K),
    ("glm-4.5-airx", 128 * K),
    ("glm-4.5-flash", 128 * K),
    ("glm-4-long", 1024 * K),
    ("glm-4-flash", 128 * K),
    ("glm-4-flash-250414", 128 * K),
    ("glm-4-flashx-250414", 128 * K),
];

/// Table of known model context windows.
///
/// Lookups are case-insensitive. An exact match wins; otherwise the longest
/// table key that prefixes the model name is used, so dated variants such as
/// `deepseek-chat-0324` resolve to their family.
#[derive(Debug, Clone)]
pub struct ContextWindows {
    windows: BTreeMap<String, usize>,
    default_window: usize,
}

impl Default for ContextWindows {
    fn default() -> Self {
        Self {
            windows: BUILTIN_WINDOWS
                .iter()
                .map(|(name, size)| ((*name).to_string(), *size))
                .collect(),
            default_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl ContextWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace entries. Keys are normalized to lowercase.
    pub fn with_overrides<'a>(mut self, overrides: impl IntoIterator<Item = (&'a String, &'a usize)>) -> Self {
        for (name, size) in overrides {
            self.windows.insert(name.trim().to_lowercase(), *size);
        }
        self
    }

    /// Change the fallback window.
    pub fn with_default_window(mut self, window: usize) -> Self {
        self.default_window = window;
        self
    }

    pub fn default_window(&self) -> usize {
        self.default_window
    }

    /// Resolve the context window for a model name.
    pub fn resolve(&self, model: Option<&str>) -> usize {
        let Some(model) = model.map(|m| m.trim().to_lowercase()).filter(|m| !m.is_empty()) else {
            return self.default_window;
        };

        if let Some(size) = self.windows.get(&model) {
            return *size;
        }

        self.windows
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, size)| *size)
            .unwrap_or(self.default_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_exact_match_case_insensitive() {
        let windows = ContextWindows::new();
        assert_eq!(windows.resolve(Some("Kimi-K2.5")), 32 * K);
        assert_eq!(windows.resolve(Some("glm-4-long")), 1024 * K);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let windows = ContextWindows::new();
        // "glm-4.5-air" must beat "glm-4.5" and "glm-4"
        assert_eq!(windows.resolve(Some("glm-4.5-air-0111")), 128 * K);
        assert_eq!(windows.resolve(Some("glm-4.7-flashx-preview")), 200 * K);
        assert_eq!(windows.resolve(Some("deepseek-chat-v3")), 128 * K);
    }

    #[test]
    fn test_unknown_and_missing_fall_back() {
        let windows = ContextWindows::new();
        assert_eq!(windows.resolve(Some("gpt-unknown")), DEFAULT_CONTEXT_WINDOW);
        assert_eq!(windows.resolve(None), DEFAULT_CONTEXT_WINDOW);
        assert_eq!(windows.resolve(Some("  ")), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn test_overrides() {
        let mut extra = HashMap::new();
        extra.insert("Tiny-Model".to_string(), 2000usize);
        extra.insert("kimi-k2.5".to_string(), 64 * K);
        let windows = ContextWindows::new()
            .with_overrides(&extra)
            .with_default_window(8 * K);

        assert_eq!(windows.resolve(Some("tiny-model")), 2000);
        assert_eq!(windows.resolve(Some("kimi-k2.5")), 64 * K);
        assert_eq!(windows.resolve(Some("other")), 8 * K);
    }
}

//! Configuration loading, environment overrides, and validation.

use super::Config;
use crate::env;
use crate::error::ConfigError;
use crate::secret::SecretString;
use std::fs;
use std::path::Path;

/// Environment variables that override file settings.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_MODEL: &str = "OPENAI_MODEL";
pub const ENV_TEMPERATURE: &str = "OPENAI_TEMPERATURE";
pub const ENV_DB_PATH: &str = "DB_PATH";
pub const ENV_ALLOWED_CHAT: &str = "TELEGRAM_CHAT_ID";

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Load the file if given, apply process environment overrides, and validate.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(env::get_var)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Only non-blank values override; a value that fails to parse is an error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.model.api_key = Some(SecretString::new(key.trim()));
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.model.base_url = url.trim().to_string();
        }
        if let Some(model) = get(ENV_MODEL) {
            self.model.model = model.trim().to_string();
        }
        if let Some(raw) = get(ENV_TEMPERATURE) {
            self.model.temperature = env::parse_value(ENV_TEMPERATURE, &raw)?;
        }
        if let Some(path) = get(ENV_DB_PATH) {
            self.storage.database_path = path.trim().into();
        }
        if let Some(chat) = get(ENV_ALLOWED_CHAT) {
            self.channels.allowed_chat_id = Some(chat.trim().to_string());
        }

        Ok(())
    }

    /// Serialize to a JSON5-compatible string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; plain JSON is valid JSON5
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        // 1. Model endpoint
        if self.model.model.trim().is_empty() {
            errors.push("model.model cannot be empty".to_string());
        }
        if !(self.model.base_url.starts_with("http://") || self.model.base_url.starts_with("https://")) {
            errors.push(format!(
                "model.base_url must be an http(s) URL, got '{}'",
                self.model.base_url
            ));
        }
        if !self.model.temperature.is_finite() || !(0.0..=2.0).contains(&self.model.temperature) {
            errors.push(format!(
                "model.temperature must be within 0-2, got {}",
                self.model.temperature
            ));
        }

        // 2. Agent loop
        if self.agent.max_iterations == 0 {
            errors.push("agent.max_iterations must be at least 1".to_string());
        }
        if self.agent.step_payload_limit == 0 {
            errors.push("agent.step_payload_limit must be at least 1".to_string());
        }

        // 3. Context budgeting
        let ctx = &self.context;
        if !(ctx.budget_ratio > 0.0 && ctx.budget_ratio <= 1.0) {
            errors.push(format!(
                "context.budget_ratio must be within (0, 1], got {}",
                ctx.budget_ratio
            ));
        }
        if ctx.scope.trim().is_empty() {
            errors.push("context.scope cannot be empty".to_string());
        }
        if ctx.fetch_limit == 0 {
            errors.push("context.fetch_limit must be at least 1".to_string());
        }
        if ctx.max_batch == 0 {
            errors.push("context.max_batch must be at least 1".to_string());
        }
        for (model, window) in &ctx.extra_windows {
            if *window == 0 {
                errors.push(format!("context.extra_windows['{}'] cannot be 0", model));
            }
        }

        // 4. Channels
        if self.channels.dedup_capacity == 0 {
            errors.push("channels.dedup_capacity must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }
}

//! Config serialization and override integration tests.

use gigwatch_core::Config;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gigwatch.json5");

    let mut config = Config::default();
    config.agent.max_iterations = 12;
    config.context.extra_windows.insert("tiny-model".to_string(), 1667);
    config.channels.allowed_chat_id = Some("42".to_string());
    std::fs::write(&path, config.to_json5().unwrap()).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.agent.max_iterations, 12);
    assert_eq!(loaded.context.extra_windows.get("tiny-model"), Some(&1667));
    assert_eq!(loaded.channels.allowed_chat_id.as_deref(), Some("42"));
    assert_eq!(loaded.model.model, config.model.model);
    assert_eq!(loaded.context.budget_ratio, config.context.budget_ratio);
}

#[test]
fn test_json5_file_with_overrides() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gigwatch.json5");
    std::fs::write(
        &path,
        r#"{
            // trailing commas and comments are fine
            model: { model: "deepseek-chat", temperature: 0.2, },
            storage: { database_path: "/var/lib/gigwatch/db.sqlite" },
        }"#,
    )
    .unwrap();

    let mut config = Config::load(&path).unwrap();
    let env: HashMap<&str, &str> = [
        ("OPENAI_API_KEY", " sk-live "),
        ("OPENAI_MODEL", "kimi-k2.5"),
        ("DB_PATH", ""),
    ]
    .into_iter()
    .collect();
    config
        .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
        .unwrap();

    assert_eq!(config.model.model, "kimi-k2.5");
    assert_eq!(config.model.temperature, 0.2);
    assert_eq!(
        config.model.api_key().map(|k| k.expose_secret()),
        Some("sk-live")
    );
    // Blank values do not override.
    assert_eq!(
        config.storage.database_path,
        Path::new("/var/lib/gigwatch/db.sqlite")
    );
    config.validate().unwrap();
}

#[test]
fn test_config_load_nonexistent() {
    assert!(Config::load(Path::new("/nonexistent/gigwatch.json5")).is_err());
}

#[test]
fn test_config_validate_collects_errors() {
    let mut config = Config::default();
    config.agent.max_iterations = 0;
    config.context.budget_ratio = 1.5;
    let message = config.validate().unwrap_err().to_string();
    assert!(message.contains("agent.max_iterations"));
    assert!(message.contains("context.budget_ratio"));
}

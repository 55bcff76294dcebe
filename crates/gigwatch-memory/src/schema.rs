//! SQLite schema, applied idempotently on connect.

pub(crate) const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS chat_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        source TEXT NOT NULL,
        external_chat_id TEXT,
        external_user_id TEXT,
        visible INTEGER NOT NULL DEFAULT 1,
        metadata_json TEXT,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_chat_messages_visible_id
        ON chat_messages (visible, id)"#,
    r#"CREATE TABLE IF NOT EXISTS chat_context_summaries (
        scope TEXT PRIMARY KEY,
        until_message_id INTEGER NOT NULL DEFAULT 0,
        summary_text TEXT NOT NULL DEFAULT '',
        updated_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS agent_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        trigger_message_id INTEGER,
        source TEXT NOT NULL,
        status TEXT NOT NULL,
        model TEXT,
        error TEXT,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        metadata_json TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS agent_run_steps (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER NOT NULL REFERENCES agent_runs (id),
        step_index INTEGER NOT NULL,
        step_type TEXT NOT NULL,
        tool_name TEXT,
        payload_json TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (run_id, step_index)
    )"#,
];

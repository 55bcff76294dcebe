//! SQLite conversation store.
//!
//! All statements go through a single-connection pool, which serializes
//! writers and gives messages, runs, and steps a total insertion order.

use crate::error::StoreError;
use crate::schema::SCHEMA;
use crate::store::ConversationStore;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gigwatch_core::{
    AgentRun, AgentStep, ConversationSummary, NewAgentRun, NewMessage, Role, RunStatus, StepType,
    StoredMessage, StoredStep,
};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite-backed implementation of [`ConversationStore`].
#[derive(Clone)]
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Open (creating if needed) a database file and apply the schema.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Opened conversation database");
        Self::from_pool(pool).await
    }

    /// A private in-memory database. Lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // The database vanishes with its only connection, so never recycle it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_run(&self, run_id: i64) -> Result<Option<AgentRun>> {
        let row = sqlx::query(&format!("{RUN_COLUMNS} WHERE id = ?"))
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    async fn fetch_messages(&self, sql: &str, cursor: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query(sql)
            .bind(cursor)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(message_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

const MESSAGE_COLUMNS: &str = "SELECT id, role, content, source, external_chat_id, external_user_id, \
     visible, metadata_json, created_at FROM chat_messages";

const RUN_COLUMNS: &str = "SELECT id, trigger_message_id, source, status, model, error, started_at, \
     finished_at, metadata_json FROM agent_runs";

const STEP_COLUMNS: &str = "SELECT id, run_id, step_index, step_type, tool_name, payload_json, \
     created_at FROM agent_run_steps";

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(format!("invalid datetime '{s}': {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn metadata_to_json(metadata: &Value) -> Result<Option<String>> {
    if metadata.is_null() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(metadata)?))
    }
}

fn metadata_from_json(raw: Option<String>) -> Value {
    // Unreadable metadata is not worth failing a read over
    raw.and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Null)
}

fn message_from_row(row: &SqliteRow) -> Result<StoredMessage> {
    let role: String = row.try_get("role")?;
    let created_at: String = row.try_get("created_at")?;
    let visible: i64 = row.try_get("visible")?;

    Ok(StoredMessage {
        id: row.try_get("id")?,
        role: Role::from_str(&role).map_err(|e| StoreError::corrupt(e.to_string()))?,
        content: row.try_get("content")?,
        source: row.try_get("source")?,
        external_chat_id: row.try_get("external_chat_id")?,
        external_user_id: row.try_get("external_user_id")?,
        visible: visible != 0,
        metadata: metadata_from_json(row.try_get("metadata_json")?),
        created_at: parse_datetime(&created_at)?,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<AgentRun> {
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let finished_at: Option<String> = row.try_get("finished_at")?;

    Ok(AgentRun {
        id: row.try_get("id")?,
        trigger_message_id: row.try_get("trigger_message_id")?,
        source: row.try_get("source")?,
        status: RunStatus::from_str(&status).map_err(|e| StoreError::corrupt(e.to_string()))?,
        model: row.try_get("model")?,
        error: row.try_get("error")?,
        started_at: parse_datetime(&started_at)?,
        finished_at: finished_at.as_deref().map(parse_datetime).transpose()?,
        metadata: metadata_from_json(row.try_get("metadata_json")?),
    })
}

fn step_from_row(row: &SqliteRow) -> Result<StoredStep> {
    let step_type: String = row.try_get("step_type")?;
    let payload: String = row.try_get("payload_json")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(StoredStep {
        id: row.try_get("id")?,
        run_id: row.try_get("run_id")?,
        step_index: row.try_get("step_index")?,
        step_type: StepType::from_str(&step_type).map_err(|e| StoreError::corrupt(e.to_string()))?,
        tool_name: row.try_get("tool_name")?,
        payload: serde_json::from_str(&payload)?,
        created_at: parse_datetime(&created_at)?,
    })
}

// ---------------------------------------------------------------------------
// ConversationStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn insert_message(&self, message: NewMessage) -> Result<StoredMessage> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO chat_messages \
             (role, content, source, external_chat_id, external_user_id, visible, metadata_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.source)
        .bind(&message.external_chat_id)
        .bind(&message.external_user_id)
        .bind(message.visible as i64)
        .bind(metadata_to_json(&message.metadata)?)
        .bind(format_datetime(&created_at))
        .execute(&self.pool)
        .await?;

        Ok(StoredMessage {
            id: result.last_insert_rowid(),
            role: message.role,
            content: message.content,
            source: message.source,
            external_chat_id: message.external_chat_id,
            external_user_id: message.external_user_id,
            visible: message.visible,
            metadata: message.metadata,
            created_at: parse_datetime(&format_datetime(&created_at))?,
        })
    }

    async fn list_visible_up_to(&self, max_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let sql = format!("{MESSAGE_COLUMNS} WHERE visible = 1 AND id <= ? ORDER BY id DESC LIMIT ?");
        let mut messages = self.fetch_messages(&sql, max_id, limit).await?;
        messages.reverse();
        Ok(messages)
    }

    async fn list_visible_latest(&self, limit: usize) -> Result<Vec<StoredMessage>> {
        self.list_visible_up_to(i64::MAX, limit).await
    }

    async fn list_visible_after(&self, min_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let sql = format!("{MESSAGE_COLUMNS} WHERE visible = 1 AND id > ? ORDER BY id ASC LIMIT ?");
        self.fetch_messages(&sql, min_id, limit).await
    }

    async fn get_summary(&self, scope: &str) -> Result<ConversationSummary> {
        let row = sqlx::query(
            "SELECT scope, until_message_id, summary_text, updated_at \
             FROM chat_context_summaries WHERE scope = ?",
        )
        .bind(scope)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(ConversationSummary::empty(scope)),
            Some(row) => {
                let updated_at: String = row.try_get("updated_at")?;
                Ok(ConversationSummary {
                    scope: row.try_get("scope")?,
                    until_message_id: row.try_get("until_message_id")?,
                    summary_text: row.try_get("summary_text")?,
                    updated_at: parse_datetime(&updated_at)?,
                })
            }
        }
    }

    async fn upsert_summary(
        &self,
        scope: &str,
        until_message_id: i64,
        summary_text: &str,
    ) -> Result<ConversationSummary> {
        let updated_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO chat_context_summaries (scope, until_message_id, summary_text, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(scope) DO UPDATE SET \
                until_message_id = excluded.until_message_id, \
                summary_text = excluded.summary_text, \
                updated_at = excluded.updated_at \
             WHERE excluded.until_message_id >= chat_context_summaries.until_message_id",
        )
        .bind(scope)
        .bind(until_message_id)
        .bind(summary_text)
        .bind(format_datetime(&updated_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let current = self.get_summary(scope).await?;
            return Err(StoreError::CursorRegression {
                scope: scope.to_string(),
                current: current.until_message_id,
                attempted: until_message_id,
            });
        }

        debug!(scope, until_message_id, "Summary cursor advanced");
        self.get_summary(scope).await
    }

    async fn start_run(&self, run: NewAgentRun) -> Result<AgentRun> {
        let started_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO agent_runs (trigger_message_id, source, status, model, started_at, metadata_json) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(run.trigger_message_id)
        .bind(&run.source)
        .bind(RunStatus::Running.as_str())
        .bind(&run.model)
        .bind(format_datetime(&started_at))
        .bind(metadata_to_json(&run.metadata)?)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.fetch_run(id).await?.ok_or(StoreError::RunNotFound(id))
    }

    async fn finish_run(&self, run_id: i64, status: RunStatus, error: Option<&str>) -> Result<AgentRun> {
        if !status.is_terminal() {
            return Err(StoreError::NonTerminalStatus(status));
        }

        let result = sqlx::query(
            "UPDATE agent_runs SET status = ?, error = ?, finished_at = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(format_datetime(&Utc::now()))
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        let run = self.fetch_run(run_id).await?.ok_or(StoreError::RunNotFound(run_id))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RunAlreadyFinished {
                run_id,
                status: run.status,
            });
        }
        Ok(run)
    }

    async fn get_run(&self, run_id: i64) -> Result<Option<AgentRun>> {
        self.fetch_run(run_id).await
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<AgentRun>> {
        let rows = sqlx::query(&format!("{RUN_COLUMNS} ORDER BY id DESC LIMIT ?"))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        let mut runs = rows.iter().map(run_from_row).collect::<Result<Vec<_>>>()?;
        runs.reverse();
        Ok(runs)
    }

    async fn append_step(&self, run_id: i64, step: AgentStep) -> Result<StoredStep> {
        let payload_json = serde_json::to_string(&step.payload)?;
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM agent_runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&mut *tx)
            .await?;
        let status = match status {
            None => return Err(StoreError::RunNotFound(run_id)),
            Some(s) => RunStatus::from_str(&s).map_err(|e| StoreError::corrupt(e.to_string()))?,
        };
        if status.is_terminal() {
            return Err(StoreError::RunAlreadyFinished { run_id, status });
        }

        let step_index: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(step_index), 0) + 1 FROM agent_run_steps WHERE run_id = ?",
        )
        .bind(run_id)
        .fetch_one(&mut *tx)
        .await?;

        let result = sqlx::query(
            "INSERT INTO agent_run_steps \
             (run_id, step_index, step_type, tool_name, payload_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(step_index)
        .bind(step.step_type.as_str())
        .bind(&step.tool_name)
        .bind(&payload_json)
        .bind(format_datetime(&created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StoredStep {
            id: result.last_insert_rowid(),
            run_id,
            step_index,
            step_type: step.step_type,
            tool_name: step.tool_name,
            payload: step.payload,
            created_at,
        })
    }

    async fn list_steps(&self, run_id: i64) -> Result<Vec<StoredStep>> {
        let rows = sqlx::query(&format!("{STEP_COLUMNS} WHERE run_id = ? ORDER BY step_index ASC"))
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(step_from_row).collect()
    }
}

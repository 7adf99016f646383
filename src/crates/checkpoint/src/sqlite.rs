//! Single-file SQLite checkpoint store.

use crate::checkpoint::SessionCheckpoint;
use crate::error::{CheckpointError, Result};
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    session_id TEXT    NOT NULL,
    iteration  INTEGER NOT NULL,
    state      TEXT    NOT NULL,
    created_at TEXT    NOT NULL,
    PRIMARY KEY (session_id, iteration)
)";

/// Checkpoint saver backed by one SQLite database file.
///
/// Rows are inserted with `INSERT OR REPLACE`, so a key is written at most
/// once logically; concurrent sessions use distinct keys and never contend
/// on the same row.
#[derive(Debug, Clone)]
pub struct SqliteSaver {
    pool: SqlitePool,
}

impl SqliteSaver {
    /// Open (creating if missing) the database file at `path` and ensure the
    /// schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        tracing::debug!(path = %path.as_ref().display(), "checkpoint store ready");
        Ok(Self { pool })
    }

    fn row_to_checkpoint(row: &SqliteRow) -> Result<SessionCheckpoint> {
        let session_id: String = row.try_get("session_id")?;
        let iteration: i64 = row.try_get("iteration")?;
        let state_text: String = row.try_get("state")?;
        let created_at_text: String = row.try_get("created_at")?;

        let iteration = u64::try_from(iteration)
            .map_err(|_| CheckpointError::Corrupt(format!("negative iteration {iteration}")))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_text)
            .map_err(|e| CheckpointError::Corrupt(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);

        Ok(SessionCheckpoint {
            session_id,
            iteration,
            state: serde_json::from_str(&state_text)?,
            created_at,
        })
    }
}

#[async_trait]
impl CheckpointSaver for SqliteSaver {
    async fn put(&self, checkpoint: SessionCheckpoint) -> Result<()> {
        if checkpoint.session_id.is_empty() {
            return Err(CheckpointError::Invalid("empty session_id".to_string()));
        }

        let iteration = i64::try_from(checkpoint.iteration)
            .map_err(|_| CheckpointError::Invalid("iteration exceeds i64".to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO checkpoints (session_id, iteration, state, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&checkpoint.session_id)
        .bind(iteration)
        .bind(serde_json::to_string(&checkpoint.state)?)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, session_id: &str, iteration: u64) -> Result<Option<SessionCheckpoint>> {
        let iteration = i64::try_from(iteration)
            .map_err(|_| CheckpointError::Invalid("iteration exceeds i64".to_string()))?;

        let row = sqlx::query(
            "SELECT session_id, iteration, state, created_at
             FROM checkpoints WHERE session_id = ? AND iteration = ?",
        )
        .bind(session_id)
        .bind(iteration)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    async fn latest(&self, session_id: &str) -> Result<Option<SessionCheckpoint>> {
        let row = sqlx::query(
            "SELECT session_id, iteration, state, created_at
             FROM checkpoints WHERE session_id = ?
             ORDER BY iteration DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_checkpoint).transpose()
    }

    async fn list(&self, session_id: &str) -> Result<Vec<SessionCheckpoint>> {
        let rows = sqlx::query(
            "SELECT session_id, iteration, state, created_at
             FROM checkpoints WHERE session_id = ?
             ORDER BY iteration ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_checkpoint).collect()
    }
}

use crate::checkpoint::SessionCheckpoint;
use crate::error::Result;
use async_trait::async_trait;

/// Storage backend for session checkpoints.
///
/// Writes are insert-or-replace per `(session_id, iteration)`; the graph
/// writes each iteration at most once per run, and replaying an iteration
/// after resumption overwrites its own earlier row.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Persist one snapshot.
    async fn put(&self, checkpoint: SessionCheckpoint) -> Result<()>;

    /// Fetch the snapshot at a specific iteration, if present.
    async fn get(&self, session_id: &str, iteration: u64) -> Result<Option<SessionCheckpoint>>;

    /// Fetch the snapshot with the highest iteration for a session.
    async fn latest(&self, session_id: &str) -> Result<Option<SessionCheckpoint>>;

    /// All snapshots for a session, ordered by ascending iteration.
    async fn list(&self, session_id: &str) -> Result<Vec<SessionCheckpoint>>;
}

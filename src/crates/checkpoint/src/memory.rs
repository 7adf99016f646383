use crate::checkpoint::SessionCheckpoint;
use crate::error::{CheckpointError, Result};
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory checkpoint saver.
///
/// Reference implementation for tests and ephemeral runs; nothing survives
/// the process. Snapshots are kept per session in ascending iteration order.
#[derive(Debug, Clone, Default)]
pub struct MemorySaver {
    storage: Arc<RwLock<HashMap<String, Vec<SessionCheckpoint>>>>,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one snapshot.
    pub async fn session_count(&self) -> usize {
        self.storage.read().await.len()
    }

    /// Total snapshot count across all sessions.
    pub async fn checkpoint_count(&self) -> usize {
        self.storage
            .read()
            .await
            .values()
            .map(|entries| entries.len())
            .sum()
    }
}

#[async_trait]
impl CheckpointSaver for MemorySaver {
    async fn put(&self, checkpoint: SessionCheckpoint) -> Result<()> {
        if checkpoint.session_id.is_empty() {
            return Err(CheckpointError::Invalid("empty session_id".to_string()));
        }

        let mut storage = self.storage.write().await;
        let entries = storage
            .entry(checkpoint.session_id.clone())
            .or_default();

        match entries.binary_search_by_key(&checkpoint.iteration, |e| e.iteration) {
            Ok(pos) => entries[pos] = checkpoint,
            Err(pos) => entries.insert(pos, checkpoint),
        }
        Ok(())
    }

    async fn get(&self, session_id: &str, iteration: u64) -> Result<Option<SessionCheckpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(session_id).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.iteration == iteration)
                .cloned()
        }))
    }

    async fn latest(&self, session_id: &str) -> Result<Option<SessionCheckpoint>> {
        let storage = self.storage.read().await;
        Ok(storage
            .get(session_id)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn list(&self, session_id: &str) -> Result<Vec<SessionCheckpoint>> {
        let storage = self.storage.read().await;
        Ok(storage.get(session_id).cloned().unwrap_or_default())
    }
}

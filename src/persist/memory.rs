use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BackingStore, IndexSnapshot};
use crate::error::Result;
use crate::models::SearchHistoryEntry;

/// Backing store that keeps snapshots in process memory.
///
/// Used by the `memory` backend and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: RwLock<IndexSnapshot>,
    history: RwLock<Vec<SearchHistoryEntry>>,
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn load_index(&self) -> Result<IndexSnapshot> {
        Ok(self.index.read().await.clone())
    }

    async fn save_index(&self, snapshot: &IndexSnapshot) -> Result<()> {
        *self.index.write().await = snapshot.clone();
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<SearchHistoryEntry>> {
        Ok(self.history.read().await.clone())
    }

    async fn save_history(&self, entries: &[SearchHistoryEntry]) -> Result<()> {
        *self.history.write().await = entries.to_vec();
        Ok(())
    }
}

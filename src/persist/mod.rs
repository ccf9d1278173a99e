//! Durable storage for the index and the search history.
//!
//! A [`BackingStore`] is only touched at explicit lifecycle points:
//! [`DocumentIndex::load`](crate::index::DocumentIndex::load) at startup and
//! [`DocumentIndex::flush`](crate::index::DocumentIndex::flush) after
//! mutations. Nothing is ever written from inside an index lock.
//!
//! | Backend | Layout |
//! |---------|--------|
//! | [`JsonFileStore`] | One JSON file: `{ "index": {...}, "history": [...] }` |
//! | [`SqliteStore`] | `documents`, `chunks`, `vectors`, `search_history` tables |
//! | [`MemoryStore`] | Process memory; lost on exit |

mod json_file;
mod memory;
mod sqlite;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::StoreConfig;
use crate::error::{IndexError, Result};
use crate::models::{Document, SearchHistoryEntry};
use crate::store::StoredVector;

/// Everything needed to rebuild a [`DocumentIndex`](crate::index::DocumentIndex).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    #[serde(default)]
    pub documents: BTreeMap<String, Document>,
    #[serde(default)]
    pub vectors: Vec<StoredVector>,
}

#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Load the saved index. A store that has never been written loads as
    /// an empty snapshot.
    async fn load_index(&self) -> Result<IndexSnapshot>;

    /// Replace the saved index with `snapshot`, atomically.
    async fn save_index(&self, snapshot: &IndexSnapshot) -> Result<()>;

    /// Saved search history, newest first.
    async fn load_history(&self) -> Result<Vec<SearchHistoryEntry>>;

    async fn save_history(&self, entries: &[SearchHistoryEntry]) -> Result<()>;
}

/// Open the backing store selected by configuration.
pub async fn open_backing_store(config: &StoreConfig) -> Result<Box<dyn BackingStore>> {
    match config.backend.as_str() {
        "json" => Ok(Box::new(JsonFileStore::new(&config.path))),
        "sqlite" => Ok(Box::new(SqliteStore::open(&config.path).await?)),
        "memory" => Ok(Box::new(MemoryStore::default())),
        other => Err(IndexError::Config(format!(
            "Unknown store backend: {}",
            other
        ))),
    }
}

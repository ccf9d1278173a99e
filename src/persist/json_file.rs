use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{BackingStore, IndexSnapshot};
use crate::error::Result;
use crate::models::SearchHistoryEntry;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    index: IndexSnapshot,
    #[serde(default)]
    history: Vec<SearchHistoryEntry>,
}

/// Backing store holding index and history in one JSON file.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash mid-write leaves the previous file intact. A missing file
/// loads as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<StoreFile> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_file(&self, file: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec(file)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "wrote store file");
        Ok(())
    }

    /// Read-modify-write under the write lock, so index and history saves
    /// never overwrite each other.
    async fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut StoreFile) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut file = self.read_file().await?;
        apply(&mut file);
        self.write_file(&file).await
    }
}

#[async_trait]
impl BackingStore for JsonFileStore {
    async fn load_index(&self) -> Result<IndexSnapshot> {
        Ok(self.read_file().await?.index)
    }

    async fn save_index(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let snapshot = snapshot.clone();
        self.update(move |file| file.index = snapshot).await
    }

    async fn load_history(&self) -> Result<Vec<SearchHistoryEntry>> {
        Ok(self.read_file().await?.history)
    }

    async fn save_history(&self, entries: &[SearchHistoryEntry]) -> Result<()> {
        let entries = entries.to_vec();
        self.update(move |file| file.history = entries).await
    }
}

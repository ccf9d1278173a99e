//! Host application layer: the message contract and its dispatcher.
//!
//! [`App`] owns the index, the search engine, the search history, and the
//! backing store, and exposes one typed method per operation. [`Command`]
//! is the same contract as a tagged JSON message, dispatched by
//! [`App::handle`] into a [`Response`]:
//!
//! ```json
//! { "type": "search", "query": "cat", "topK": 3 }
//! { "success": true, "results": [ { "url": "...", "chunkId": "...", ... } ] }
//! ```
//!
//! Every mutation is followed by a flush of the index to the backing store.
//! If the flush fails the in-memory change stands and the caller receives
//! [`IndexError::StoreUnavailable`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::{IndexError, Result};
use crate::history::SearchHistory;
use crate::index::{DocumentIndex, IndexSettings};
use crate::models::{Document, IndexOutcome, SearchHistoryEntry, SearchResult};
use crate::persist::{open_backing_store, BackingStore};
use crate::search::SearchEngine;

/// A host message, tagged by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    IndexPage {
        url: String,
        #[serde(default)]
        title: String,
        content: String,
    },
    Search {
        query: String,
        #[serde(default, rename = "topK")]
        top_k: Option<i64>,
    },
    DeletePage {
        url: String,
    },
    ClearAllData,
    GetDocumentMap,
    GetSearchHistory {
        #[serde(default)]
        limit: Option<usize>,
    },
    ClearSearchHistory,
}

/// Reply to a [`Command`]. Only the fields relevant to the command are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code, see [`IndexError::code`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_map: Option<BTreeMap<String, Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<SearchHistoryEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_indexed: Option<usize>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(err: &IndexError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
            code: Some(err.code().to_string()),
            ..Self::default()
        }
    }
}

pub struct App {
    index: Arc<DocumentIndex>,
    engine: SearchEngine,
    history: Mutex<SearchHistory>,
    store: Option<Box<dyn BackingStore>>,
}

impl App {
    pub fn new(
        index: Arc<DocumentIndex>,
        store: Option<Box<dyn BackingStore>>,
        history: SearchHistory,
        default_top_k: i64,
    ) -> Self {
        Self {
            engine: SearchEngine::new(index.clone()).with_default_top_k(default_top_k),
            index,
            history: Mutex::new(history),
            store,
        }
    }

    /// Build the application from configuration and load persisted state.
    pub async fn open(config: &Config) -> Result<Self> {
        if !config.embedding.is_enabled() {
            warn!("embedding provider is disabled; indexing and search will fail");
        }
        let embedder = create_embedder(&config.embedding)?;
        let store = open_backing_store(&config.store).await?;
        let index = DocumentIndex::in_memory(
            embedder,
            config.retrieval.metric,
            IndexSettings::from_config(config),
        );
        let app = Self::new(
            Arc::new(index),
            Some(store),
            SearchHistory::new(config.history.capacity),
            config.retrieval.top_k,
        );
        app.load().await?;
        info!(
            backend = %config.store.backend,
            provider = %config.embedding.provider,
            documents = app.index.len().await,
            "application ready"
        );
        Ok(app)
    }

    /// Reload index and history from the backing store, if any.
    pub async fn load(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        self.index.load(store.as_ref()).await?;
        let entries = store.load_history().await?;
        let mut history = self.history.lock().await;
        *history = SearchHistory::from_entries(entries, history.capacity());
        Ok(())
    }

    pub fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    async fn flush(&self) -> Result<()> {
        match &self.store {
            Some(store) => self.index.flush(store.as_ref()).await,
            None => Ok(()),
        }
    }

    async fn flush_history(&self, entries: &[SearchHistoryEntry]) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_history(entries).await {
                warn!(error = %e, "failed to save search history");
            }
        }
    }

    pub async fn index_page(&self, url: &str, title: &str, content: &str) -> Result<IndexOutcome> {
        let outcome = self.index.index_document(url, title, content).await?;
        self.flush().await?;
        Ok(outcome)
    }

    /// Search and record the query in the history log.
    pub async fn search(&self, query: &str, top_k: Option<i64>) -> Result<Vec<SearchResult>> {
        let results = self.engine.search_with(query, top_k).await?;
        if !query.trim().is_empty() {
            // Saved under the lock so concurrent searches persist in order.
            let mut history = self.history.lock().await;
            history.record(query.trim(), results.len());
            self.flush_history(&history.entries()).await;
        }
        Ok(results)
    }

    /// Delete a page. Unknown URLs succeed without effect.
    pub async fn delete_page(&self, url: &str) -> Result<bool> {
        let existed = self.index.delete_page(url).await?;
        if existed {
            self.flush().await?;
        }
        Ok(existed)
    }

    /// Empty the index. Search history is kept.
    pub async fn clear_all_data(&self) -> Result<()> {
        self.index.clear_all().await?;
        self.flush().await
    }

    pub async fn get_document(&self, url: &str) -> Result<Document> {
        self.index
            .get_document(url)
            .await
            .ok_or_else(|| IndexError::NotFound(url.to_string()))
    }

    pub async fn document_map(&self) -> BTreeMap<String, Document> {
        self.index.document_map().await
    }

    /// Recent searches, newest first; `None` returns the whole log.
    pub async fn search_history(&self, limit: Option<usize>) -> Vec<SearchHistoryEntry> {
        let history = self.history.lock().await;
        history.recent(limit.unwrap_or(history.capacity()))
    }

    pub async fn clear_search_history(&self) -> Result<()> {
        let mut history = self.history.lock().await;
        history.clear();
        if let Some(store) = &self.store {
            store.save_history(&[]).await?;
        }
        Ok(())
    }

    /// Dispatch one command. Failures become `success: false` responses.
    pub async fn handle(&self, command: Command) -> Response {
        let result = match command {
            Command::IndexPage {
                url,
                title,
                content,
            } => self
                .index_page(&url, &title, &content)
                .await
                .map(|outcome| Response {
                    chunks_indexed: Some(outcome.chunks_indexed),
                    ..Response::ok()
                }),
            Command::Search { query, top_k } => {
                self.search(&query, top_k).await.map(|results| Response {
                    results: Some(results),
                    ..Response::ok()
                })
            }
            Command::DeletePage { url } => self.delete_page(&url).await.map(|_| Response::ok()),
            Command::ClearAllData => self.clear_all_data().await.map(|_| Response::ok()),
            Command::GetDocumentMap => Ok(Response {
                document_map: Some(self.document_map().await),
                ..Response::ok()
            }),
            Command::GetSearchHistory { limit } => Ok(Response {
                history: Some(self.search_history(limit).await),
                ..Response::ok()
            }),
            Command::ClearSearchHistory => {
                self.clear_search_history().await.map(|_| Response::ok())
            }
        };

        result.unwrap_or_else(|e| {
            warn!(code = e.code(), error = %e, "command failed");
            Response::failure(&e)
        })
    }
}

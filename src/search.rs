//! Query-time retrieval.
//!
//! [`SearchEngine`] embeds a query, scores it against every stored vector,
//! and enriches the best `top_k` hits with document metadata:
//!
//! 1. Non-positive `top_k`, a blank query, or an empty store return no
//!    results without calling the embedder.
//! 2. The query is embedded (bounded by the embedding timeout).
//! 3. All stored vectors are scored and stably sorted by descending score,
//!    so equal scores keep store iteration order.
//! 4. The first `top_k` hits get their chunk text and document title. A hit
//!    whose document metadata is missing falls back to its URL as title.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::index::DocumentIndex;
use crate::models::SearchResult;

pub struct SearchEngine {
    index: Arc<DocumentIndex>,
    default_top_k: i64,
}

impl SearchEngine {
    pub fn new(index: Arc<DocumentIndex>) -> Self {
        Self {
            index,
            default_top_k: 5,
        }
    }

    pub fn with_default_top_k(mut self, top_k: i64) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    /// Search with an explicit result limit; `None` uses the default.
    pub async fn search_with(&self, query: &str, top_k: Option<i64>) -> Result<Vec<SearchResult>> {
        self.search(query, top_k.unwrap_or(self.default_top_k)).await
    }

    /// Return at most `top_k` hits for `query`, best first.
    pub async fn search(&self, query: &str, top_k: i64) -> Result<Vec<SearchResult>> {
        if top_k <= 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        if self.index.read().await.vectors.is_empty() {
            debug!("search on empty index");
            return Ok(Vec::new());
        }

        let query_vec = self.index.embed_query(query).await?;

        let state = self.index.read().await;
        let mut scored = state.vectors.score_all(&query_vec)?;
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k as usize);

        let results: Vec<SearchResult> = scored
            .into_iter()
            .enumerate()
            .map(|(i, hit)| {
                let document = state.documents.get(&hit.url);
                if document.is_none() {
                    warn!(url = %hit.url, chunk_id = %hit.chunk_id, "search hit without document metadata");
                }
                let title = document
                    .map(|d| d.title.as_str())
                    .filter(|t| !t.is_empty())
                    .unwrap_or(&hit.url)
                    .to_string();
                let text = document
                    .and_then(|d| d.chunk(&hit.chunk_id))
                    .map(|c| c.text.clone())
                    .unwrap_or_default();
                SearchResult {
                    url: hit.url,
                    chunk_id: hit.chunk_id,
                    text,
                    title,
                    score: hit.score,
                    rank: i + 1,
                }
            })
            .collect();

        debug!(query, results = results.len(), "search complete");
        Ok(results)
    }
}

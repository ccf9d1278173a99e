//! Core data models used throughout Page Index.
//!
//! These types represent the documents, chunks, and search results that flow
//! through the indexing and retrieval pipeline. Their serde shape is the
//! wire shape of the host message contract (`getDocumentMap`, `search`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One indexed page, keyed by its normalized URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,
    pub title: String,
    /// Chunks in chunker order; `chunks[i].ordinal == i`.
    pub chunks: Vec<Chunk>,
    pub indexed_at: DateTime<Utc>,
}

impl Document {
    pub fn chunk(&self, chunk_id: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.id == chunk_id)
    }
}

/// A bounded span of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Derived from the document URL and ordinal, see [`chunk_id`].
    pub id: String,
    pub ordinal: usize,
    pub text: String,
    /// SHA-256 of `text`, used to reuse vectors across re-indexing.
    #[serde(default)]
    pub hash: String,
}

/// A ranked search hit, enriched with document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    #[serde(rename = "chunkId")]
    pub chunk_id: String,
    pub text: String,
    /// Document title, or the URL when metadata could not be resolved.
    pub title: String,
    pub score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
}

/// One entry of the host's search history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub query: String,
    #[serde(rename = "resultCount")]
    pub result_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Summary of a successful `index_document` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexOutcome {
    pub url: String,
    /// Chunks produced by the chunker.
    pub chunks_total: usize,
    /// Chunks that have a vector in the store after the commit.
    pub chunks_indexed: usize,
    /// Chunks below the minimum length, kept as metadata without a vector.
    pub chunks_skipped: usize,
    /// Chunks whose previous vector was reused instead of re-embedding.
    pub chunks_reused: usize,
}

/// Build the chunk id for a document URL and chunk ordinal.
pub fn chunk_id(url: &str, ordinal: usize) -> String {
    format!("{}-{}", url, ordinal)
}

/// Normalize a page URL into a document key.
///
/// Surrounding whitespace and the `#fragment` are dropped, since they do
/// not identify a different page. Strings that do not parse as URLs are
/// used trimmed, as-is.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match url::Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

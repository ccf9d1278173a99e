//! Error type shared by every library component.
//!
//! All failures of chunking, embedding, indexing, search, and persistence
//! are values of [`IndexError`]. Nothing in the library panics on a
//! per-document or per-query failure; hosts decide how to surface errors.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    /// The chunker produced nothing usable from the page text.
    #[error("No meaningful content found to index")]
    EmptyContent,

    /// The embedder failed or returned malformed output.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vectors of inconsistent length met during scoring or insertion.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Document not found: {0}")]
    NotFound(String),

    /// The embedding call exceeded the configured bound.
    #[error("Embedding timed out after {0:?}")]
    Timeout(Duration),

    /// The backing persistence layer failed to read or write.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IndexError {
    /// Stable machine-readable code, used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::EmptyContent => "empty_content",
            IndexError::Embedding(_) => "embedding_error",
            IndexError::DimensionMismatch { .. } => "dimension_mismatch",
            IndexError::NotFound(_) => "not_found",
            IndexError::Timeout(_) => "timeout",
            IndexError::StoreUnavailable(_) => "store_unavailable",
            IndexError::Config(_) => "config",
        }
    }
}

impl From<sqlx::Error> for IndexError {
    fn from(e: sqlx::Error) -> Self {
        IndexError::StoreUnavailable(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::StoreUnavailable(format!("malformed snapshot: {}", e))
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(e: reqwest::Error) -> Self {
        IndexError::Embedding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            IndexError::EmptyContent,
            IndexError::Embedding("x".into()),
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2,
            },
            IndexError::NotFound("u".into()),
            IndexError::Timeout(Duration::from_secs(1)),
            IndexError::StoreUnavailable("x".into()),
            IndexError::Config("x".into()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_io_error_maps_to_store_unavailable() {
        let err: IndexError = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert_eq!(err.code(), "store_unavailable");
        assert!(err.to_string().contains("disk gone"));
    }
}

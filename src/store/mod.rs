//! Vector storage abstraction for Page Index.
//!
//! The [`VectorStore`] trait holds chunk vectors keyed by document URL and
//! chunk id and answers exhaustive similarity scans. Corpora are expected to
//! stay in the hundreds to low thousands of chunks, so a linear scan is
//! used; an indexed structure can be swapped in behind the same trait.
//!
//! The store does no locking of its own. [`DocumentIndex`](crate::index::DocumentIndex)
//! owns it together with the document metadata behind a single lock, so a
//! metadata change and its vector changes become visible to readers at once.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

/// Similarity metric used to score a query vector against stored vectors.
///
/// Chosen once, when the store is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `dot(a, b) / (‖a‖ × ‖b‖)`, in `[-1, 1]`; `0` when either norm is zero.
    #[default]
    Cosine,
    /// Raw dot product; unbounded.
    Dot,
    /// `1 / (1 + ‖a − b‖)`, in `(0, 1]`.
    Euclidean,
}

impl Metric {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "cosine" => Ok(Metric::Cosine),
            "dot" => Ok(Metric::Dot),
            "euclidean" => Ok(Metric::Euclidean),
            other => Err(IndexError::Config(format!(
                "Unknown similarity metric: '{}'. Must be cosine, dot, or euclidean.",
                other
            ))),
        }
    }

    /// Score `a` against `b`. Vectors of different length are an error.
    pub fn score(self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(IndexError::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        Ok(match self {
            Metric::Cosine => cosine_similarity(a, b),
            Metric::Dot => dot(a, b),
            Metric::Euclidean => 1.0 / (1.0 + euclidean_distance(a, b)),
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Compute cosine similarity between two equal-length vectors.
///
/// Returns a value in `[-1.0, 1.0]`, and exactly `0.0` when either vector
/// has zero magnitude (including empty vectors).
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// A stored vector with its owning document and chunk id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVector {
    pub url: String,
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

/// One row of an exhaustive scan: a chunk and its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub url: String,
    pub chunk_id: String,
    pub score: f32,
}

/// Abstract vector storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`put`](VectorStore::put) | Upsert one vector by chunk id |
/// | [`delete_document`](VectorStore::delete_document) | Remove all vectors of a document |
/// | [`clear`](VectorStore::clear) | Remove everything |
/// | [`score_all`](VectorStore::score_all) | Score every stored vector against a query |
pub trait VectorStore: Send + Sync {
    /// The metric fixed at construction.
    fn metric(&self) -> Metric;

    /// Dimensionality shared by every stored vector, `None` when empty.
    fn dims(&self) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of vectors stored for one document.
    fn document_len(&self, url: &str) -> usize;

    /// Upsert one vector, overwriting any vector stored under `chunk_id`.
    ///
    /// Fails with [`IndexError::DimensionMismatch`] when the store already
    /// holds vectors of another length.
    fn put(&mut self, url: &str, chunk_id: &str, vector: Vec<f32>) -> Result<()>;

    fn get(&self, chunk_id: &str) -> Option<&[f32]>;

    /// Remove every vector of a document. Returns how many were removed;
    /// an unknown document removes nothing and is not an error.
    fn delete_document(&mut self, url: &str) -> usize;

    fn clear(&mut self);

    /// Score `query` against every stored vector, in store iteration order.
    fn score_all(&self, query: &[f32]) -> Result<Vec<ScoredChunk>>;

    /// All stored vectors in iteration order, for persistence.
    fn entries(&self) -> Vec<StoredVector>;
}

/// Encode a float vector as little-endian f32 bytes.
///
/// ```rust
/// use page_index::store::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_metric_rejects_mismatched_lengths() {
        let err = Metric::Cosine.score(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_dot_and_euclidean() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        assert!((Metric::Dot.score(&a, &b).unwrap() - 11.0).abs() < 1e-6);
        assert!((Metric::Euclidean.score(&a, &a).unwrap() - 1.0).abs() < 1e-6);
        let far = Metric::Euclidean.score(&a, &b).unwrap();
        assert!(far > 0.0 && far < 1.0);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(Metric::parse("dot").unwrap(), Metric::Dot);
        assert!(Metric::parse("manhattan").is_err());
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }
}

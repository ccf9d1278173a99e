//! In-memory [`VectorStore`] implementation.
//!
//! Vectors live in a `Vec` in insertion order, which is also the scan order
//! used to break score ties. A side `HashMap` maps chunk ids to positions.

use std::collections::HashMap;

use crate::error::{IndexError, Result};

use super::{Metric, ScoredChunk, StoredVector, VectorStore};

/// Brute-force vector store over a flat list of vectors.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    metric: Metric,
    vectors: Vec<StoredVector>,
    positions: HashMap<String, usize>,
}

impl InMemoryVectorStore {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            vectors: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn reindex_positions(&mut self) {
        self.positions = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, sv)| (sv.chunk_id.clone(), i))
            .collect();
    }
}

impl VectorStore for InMemoryVectorStore {
    fn metric(&self) -> Metric {
        self.metric
    }

    fn dims(&self) -> Option<usize> {
        self.vectors.first().map(|sv| sv.vector.len())
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn document_len(&self, url: &str) -> usize {
        self.vectors.iter().filter(|sv| sv.url == url).count()
    }

    fn put(&mut self, url: &str, chunk_id: &str, vector: Vec<f32>) -> Result<()> {
        if let Some(&pos) = self.positions.get(chunk_id) {
            // Overwriting the only stored vector may change the dimensionality.
            if self.vectors.len() > 1 {
                let expected = self.vectors[pos].vector.len();
                if expected != vector.len() {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
            }
            self.vectors[pos] = StoredVector {
                url: url.to_string(),
                chunk_id: chunk_id.to_string(),
                vector,
            };
            return Ok(());
        }

        if let Some(expected) = self.dims() {
            if expected != vector.len() {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        self.positions
            .insert(chunk_id.to_string(), self.vectors.len());
        self.vectors.push(StoredVector {
            url: url.to_string(),
            chunk_id: chunk_id.to_string(),
            vector,
        });
        Ok(())
    }

    fn get(&self, chunk_id: &str) -> Option<&[f32]> {
        self.positions
            .get(chunk_id)
            .map(|&pos| self.vectors[pos].vector.as_slice())
    }

    fn delete_document(&mut self, url: &str) -> usize {
        let before = self.vectors.len();
        self.vectors.retain(|sv| sv.url != url);
        let removed = before - self.vectors.len();
        if removed > 0 {
            self.reindex_positions();
        }
        removed
    }

    fn clear(&mut self) {
        self.vectors.clear();
        self.positions.clear();
    }

    fn score_all(&self, query: &[f32]) -> Result<Vec<ScoredChunk>> {
        self.vectors
            .iter()
            .map(|sv| {
                Ok(ScoredChunk {
                    url: sv.url.clone(),
                    chunk_id: sv.chunk_id.clone(),
                    score: self.metric.score(query, &sv.vector)?,
                })
            })
            .collect()
    }

    fn entries(&self) -> Vec<StoredVector> {
        self.vectors.clone()
    }
}

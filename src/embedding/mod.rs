//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and its backends:
//! - **[`HashingEmbedder`]**: deterministic, offline feature hashing. The default.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]**: calls the OpenAI embeddings API.
//! - **`LocalEmbedder`**: runs a model in-process via fastembed
//!   (`local-embeddings-fastembed` feature).
//! - **[`DisabledEmbedder`]**: fails every call.
//!
//! # Failure Semantics
//!
//! Embedders fail closed. A failed or malformed embedding is always an
//! [`IndexError::Embedding`]; no backend substitutes a zero vector, which
//! would be indistinguishable from a real low-magnitude embedding and
//! silently corrupt ranking.
//!
//! # Provider Selection
//!
//! ```rust
//! use page_index::config::EmbeddingConfig;
//! use page_index::embedding::create_embedder;
//!
//! let config = EmbeddingConfig::default(); // provider = "hash"
//! let embedder = create_embedder(&config).unwrap();
//! assert_eq!(embedder.model_name(), "hash");
//! assert_eq!(embedder.dims(), 384);
//! ```

#[cfg(feature = "local-embeddings-fastembed")]
mod local;
mod remote;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalEmbedder;
pub use remote::{OllamaEmbedder, OpenAIEmbedder};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::error::{IndexError, Result};

/// Default dimensionality of the hashing embedder.
pub const DEFAULT_HASH_DIMS: usize = 384;

/// Trait for embedding backends.
///
/// Every vector an instance returns has exactly [`dims`](Embedder::dims)
/// components, and identical input yields an identical vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"mxbai-embed-large"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1024`).
    fn dims(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning vectors in input order.
    ///
    /// Backends with a batch API override this to submit all texts in one
    /// call; the default embeds them one by one.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Check a backend response: one vector per input, each of length `dims`,
/// all components finite.
pub fn validate_embeddings(
    vectors: Vec<Vec<f32>>,
    expected_count: usize,
    dims: usize,
) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected_count {
        return Err(IndexError::Embedding(format!(
            "malformed response: expected {} vectors, got {}",
            expected_count,
            vectors.len()
        )));
    }
    for v in &vectors {
        if v.len() != dims {
            return Err(IndexError::Embedding(format!(
                "malformed response: expected {} dimensions, got {}",
                dims,
                v.len()
            )));
        }
        if v.iter().any(|x| !x.is_finite()) {
            return Err(IndexError::Embedding(
                "malformed response: non-finite component".to_string(),
            ));
        }
    }
    Ok(vectors)
}

// ============ Disabled ============

/// An embedder that always fails.
///
/// Used when `embedding.provider = "disabled"`. Indexing and non-empty
/// searches report an embedding error; an empty index still searches to
/// an empty result.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(IndexError::Embedding(
            "Embedding provider is disabled".to_string(),
        ))
    }
}

// ============ Hashing ============

/// Deterministic feature-hashing embedder.
///
/// Each whitespace-separated term is lower-cased and stripped of edge
/// punctuation, then hashed with SHA-256: the first eight digest bytes pick
/// a bucket, the ninth picks a sign. Term counts accumulate per bucket and
/// the result is L2-normalized. Needs no model or network, and gives
/// lexical-overlap similarity rather than semantic similarity.
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split_whitespace().map(|word| {
            let stripped = word.trim_matches(|c: char| !c.is_alphanumeric());
            if stripped.is_empty() {
                word.to_lowercase()
            } else {
                stripped.to_lowercase()
            }
        })
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];
        let mut term_count = 0usize;

        for term in Self::terms(text) {
            let digest = Sha256::digest(term.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            term_count += 1;
        }

        if term_count == 0 {
            return Err(IndexError::Embedding(
                "text has no embeddable terms".to_string(),
            ));
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(IndexError::Embedding(
                "hashed terms cancelled to a zero vector".to_string(),
            ));
        }
        for x in &mut vector {
            *x /= norm;
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }
}

/// Create the [`Embedder`] selected by configuration.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"hash"` | [`HashingEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
/// | `"disabled"` | [`DisabledEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashingEmbedder::new(
            config.dims.unwrap_or(DEFAULT_HASH_DIMS),
        ))),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::from_env(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(IndexError::Config(
            "Local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        other => Err(IndexError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

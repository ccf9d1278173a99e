//! Document index: the aggregate root of the retrieval engine.
//!
//! [`DocumentIndex`] coordinates the chunker, an [`Embedder`], and a
//! [`VectorStore`], and owns per-document metadata. Metadata and vectors
//! live together behind one `RwLock`, so a reader (search, snapshot) always
//! sees either the complete old version of a document or the complete new
//! one.
//!
//! # Write Path
//!
//! `index_document`, `delete_page`, `clear_all`, and `load` are serialized
//! by a writer mutex. Indexing embeds every chunk *before* taking the state
//! write lock, so searches keep running while a slow embedder works, and a
//! failed or timed-out embedding leaves the previous version untouched.
//!
//! ```text
//! chunk ─▶ embed (no state lock) ─▶ write lock ─▶ drop old vectors
//!                                                 put new vectors
//!                                                 replace metadata
//! ```

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::chunk::{chunk_text, content_hash, DEFAULT_MAX_CHUNK_SIZE};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{IndexError, Result};
use crate::models::{chunk_id, normalize_url, Chunk, Document, IndexOutcome};
use crate::persist::{BackingStore, IndexSnapshot};
use crate::store::memory::InMemoryVectorStore;
use crate::store::{Metric, VectorStore};

/// Indexing parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub max_chunk_size: usize,
    /// Chunks whose trimmed length is below this are not embedded.
    pub min_chunk_chars: usize,
    /// Texts per embedder call.
    pub batch_size: usize,
    /// Bound on all embedding work of one index or search call.
    pub embed_timeout: Duration,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            min_chunk_chars: 10,
            batch_size: 32,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

impl IndexSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_chunk_size: config.chunking.max_chunk_size,
            min_chunk_chars: config.chunking.min_chunk_chars,
            batch_size: config.embedding.batch_size.max(1),
            embed_timeout: config.embedding.timeout(),
        }
    }
}

/// Metadata and vectors, always mutated together.
pub(crate) struct IndexState {
    pub(crate) documents: BTreeMap<String, Document>,
    pub(crate) vectors: Box<dyn VectorStore>,
}

pub struct DocumentIndex {
    state: RwLock<IndexState>,
    writer: Mutex<()>,
    embedder: Arc<dyn Embedder>,
    settings: IndexSettings,
}

impl DocumentIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Box<dyn VectorStore>,
        settings: IndexSettings,
    ) -> Self {
        Self {
            state: RwLock::new(IndexState {
                documents: BTreeMap::new(),
                vectors,
            }),
            writer: Mutex::new(()),
            embedder,
            settings,
        }
    }

    /// An index over an in-memory vector store with the given metric.
    pub fn in_memory(embedder: Arc<dyn Embedder>, metric: Metric, settings: IndexSettings) -> Self {
        Self::new(
            embedder,
            Box::new(InMemoryVectorStore::new(metric)),
            settings,
        )
    }

    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().await
    }

    /// Chunk, embed, and store a page, replacing any previous version.
    ///
    /// Fails with [`IndexError::EmptyContent`] when the text yields no chunks.
    /// On any failure nothing is committed and the previous version of the
    /// document, if any, stays intact.
    pub async fn index_document(
        &self,
        url: &str,
        title: &str,
        raw_text: &str,
    ) -> Result<IndexOutcome> {
        let url = normalize_url(url);
        let texts = chunk_text(raw_text, self.settings.max_chunk_size);
        if texts.is_empty() {
            return Err(IndexError::EmptyContent);
        }

        let chunks: Vec<Chunk> = texts
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Chunk {
                id: chunk_id(&url, ordinal),
                ordinal,
                hash: content_hash(&text),
                text,
            })
            .collect();

        let _writer = self.writer.lock().await;

        // Decide per chunk: skip as noise, reuse the stored vector, or embed.
        let mut reused: Vec<(String, Vec<f32>)> = Vec::new();
        let mut pending: Vec<&Chunk> = Vec::new();
        let mut skipped = 0usize;
        {
            let state = self.state.read().await;
            let previous = state.documents.get(&url);
            for chunk in &chunks {
                if chunk.text.trim().chars().count() < self.settings.min_chunk_chars {
                    skipped += 1;
                    continue;
                }
                let unchanged = previous
                    .and_then(|doc| doc.chunk(&chunk.id))
                    .map(|old| old.hash == chunk.hash)
                    .unwrap_or(false);
                match state.vectors.get(&chunk.id) {
                    Some(vector) if unchanged && self.fits_embedder(vector) => {
                        reused.push((chunk.id.clone(), vector.to_vec()));
                    }
                    _ => pending.push(chunk),
                }
            }
        }

        let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
        let embedded = self.embed_texts(&texts).await?;

        let chunks_reused = reused.len();
        let mut new_vectors = reused;
        new_vectors.extend(
            pending
                .iter()
                .map(|c| c.id.clone())
                .zip(embedded),
        );
        // Keep chunker order in the store so ties rank in document order.
        let order: HashMap<&str, usize> = chunks
            .iter()
            .map(|c| (c.id.as_str(), c.ordinal))
            .collect();
        new_vectors.sort_by_key(|(id, _)| order.get(id.as_str()).copied().unwrap_or(usize::MAX));

        let chunks_indexed = new_vectors.len();
        let mut state = self.state.write().await;
        self.commit_vectors(&mut state, &url, new_vectors)?;

        let chunks_total = chunks.len();
        state.documents.insert(
            url.clone(),
            Document {
                url: url.clone(),
                title: title.to_string(),
                chunks,
                indexed_at: Utc::now(),
            },
        );

        let outcome = IndexOutcome {
            url,
            chunks_total,
            chunks_indexed,
            chunks_skipped: skipped,
            chunks_reused,
        };
        info!(
            url = %outcome.url,
            chunks = outcome.chunks_total,
            indexed = outcome.chunks_indexed,
            reused = outcome.chunks_reused,
            skipped = outcome.chunks_skipped,
            "indexed document"
        );
        Ok(outcome)
    }

    /// Swap a document's vectors for `new_vectors`, restoring the old ones
    /// if any insert fails.
    fn commit_vectors(
        &self,
        state: &mut IndexState,
        url: &str,
        new_vectors: Vec<(String, Vec<f32>)>,
    ) -> Result<()> {
        let store = &mut state.vectors;

        if let (Some(stored), Some((_, first))) = (store.dims(), new_vectors.first()) {
            let others = store.len() - store.document_len(url);
            if stored != first.len() && others > 0 {
                return Err(IndexError::DimensionMismatch {
                    expected: stored,
                    actual: first.len(),
                });
            }
        }

        let previous: Vec<_> = store
            .entries()
            .into_iter()
            .filter(|sv| sv.url == url)
            .collect();
        store.delete_document(url);

        for (id, vector) in new_vectors {
            if let Err(e) = store.put(url, &id, vector) {
                warn!(url, error = %e, "vector insert failed, restoring previous version");
                store.delete_document(url);
                for sv in previous {
                    if let Err(restore) = store.put(&sv.url, &sv.chunk_id, sv.vector) {
                        warn!(url, chunk_id = %sv.chunk_id, error = %restore, "failed to restore vector");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn fits_embedder(&self, vector: &[f32]) -> bool {
        let dims = self.embedder.dims();
        dims == 0 || vector.len() == dims
    }

    /// Embed texts in batches, bounded by the configured timeout.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let work = async {
            let mut vectors = Vec::with_capacity(texts.len());
            for batch in texts.chunks(self.settings.batch_size.max(1)) {
                debug!(count = batch.len(), "embedding batch");
                vectors.extend(self.embedder.embed_batch(batch).await?);
            }
            Ok::<_, IndexError>(vectors)
        };

        let vectors = tokio::time::timeout(self.settings.embed_timeout, work)
            .await
            .map_err(|_| IndexError::Timeout(self.settings.embed_timeout))??;

        self.check_vectors(&vectors, texts.len())?;
        Ok(vectors)
    }

    /// Embed a search query under the same timeout and validation rules.
    pub(crate) async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let vector = tokio::time::timeout(self.settings.embed_timeout, self.embedder.embed(query))
            .await
            .map_err(|_| IndexError::Timeout(self.settings.embed_timeout))??;
        self.check_vectors(std::slice::from_ref(&vector), 1)?;
        Ok(vector)
    }

    fn check_vectors(&self, vectors: &[Vec<f32>], expected: usize) -> Result<()> {
        if vectors.len() != expected {
            return Err(IndexError::Embedding(format!(
                "malformed output: expected {} vectors, got {}",
                expected,
                vectors.len()
            )));
        }
        let dims = match self.embedder.dims() {
            0 => vectors.first().map(|v| v.len()).unwrap_or(0),
            d => d,
        };
        for v in vectors {
            if v.len() != dims || v.is_empty() {
                return Err(IndexError::Embedding(format!(
                    "malformed output: expected {} dimensions, got {}",
                    dims,
                    v.len()
                )));
            }
        }
        Ok(())
    }

    /// Remove a document's metadata and all of its vectors.
    ///
    /// Idempotent: returns `false` when the URL was not indexed.
    pub async fn delete_page(&self, url: &str) -> Result<bool> {
        let url = normalize_url(url);
        let _writer = self.writer.lock().await;
        let mut state = self.state.write().await;
        let existed = state.documents.remove(&url).is_some();
        let removed = state.vectors.delete_document(&url);
        info!(url = %url, existed, vectors_removed = removed, "deleted document");
        Ok(existed || removed > 0)
    }

    /// Empty both the metadata and the vector store.
    pub async fn clear_all(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut state = self.state.write().await;
        let documents = state.documents.len();
        state.documents.clear();
        state.vectors.clear();
        info!(documents, "cleared index");
        Ok(())
    }

    pub async fn get_document(&self, url: &str) -> Option<Document> {
        let url = normalize_url(url);
        self.state.read().await.documents.get(&url).cloned()
    }

    /// Read-only snapshot of all document metadata, keyed by URL.
    pub async fn document_map(&self) -> BTreeMap<String, Document> {
        self.state.read().await.documents.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn vector_count(&self) -> usize {
        self.state.read().await.vectors.len()
    }

    /// Number of vectors stored for one document.
    pub async fn document_vector_count(&self, url: &str) -> usize {
        let url = normalize_url(url);
        self.state.read().await.vectors.document_len(&url)
    }

    /// Whether the vector store holds a vector under `chunk_id`.
    pub async fn has_vector(&self, chunk_id: &str) -> bool {
        self.state.read().await.vectors.get(chunk_id).is_some()
    }

    /// Replace the in-memory state with the snapshot held by `store`.
    ///
    /// Vectors that reference an unknown document or chunk are dropped with a
    /// warning. Vectors of inconsistent dimensionality reject the whole
    /// snapshot and leave the current state untouched.
    pub async fn load(&self, store: &dyn BackingStore) -> Result<()> {
        let snapshot = store.load_index().await?;
        let _writer = self.writer.lock().await;

        let IndexSnapshot { documents, vectors } = snapshot;
        let mut valid = Vec::with_capacity(vectors.len());
        let mut dims: Option<usize> = None;
        for sv in vectors {
            let known = documents
                .get(&sv.url)
                .map(|doc| doc.chunk(&sv.chunk_id).is_some())
                .unwrap_or(false);
            if !known {
                warn!(url = %sv.url, chunk_id = %sv.chunk_id, "dropping orphaned vector");
                continue;
            }
            match dims {
                Some(expected) if expected != sv.vector.len() => {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: sv.vector.len(),
                    });
                }
                None => dims = Some(sv.vector.len()),
                _ => {}
            }
            valid.push(sv);
        }

        let mut state = self.state.write().await;
        state.vectors.clear();
        for sv in valid {
            state.vectors.put(&sv.url, &sv.chunk_id, sv.vector)?;
        }
        state.documents = documents;
        info!(
            documents = state.documents.len(),
            vectors = state.vectors.len(),
            "loaded index"
        );
        Ok(())
    }

    /// Write a read-consistent snapshot of the index to `store`.
    ///
    /// The writer lock is held until the save completes, so flushes reach
    /// the store in mutation order and the last save always holds the
    /// latest state. Searches are not blocked.
    pub async fn flush(&self, store: &dyn BackingStore) -> Result<()> {
        let _writer = self.writer.lock().await;
        let snapshot = {
            let state = self.state.read().await;
            IndexSnapshot {
                documents: state.documents.clone(),
                vectors: state.vectors.entries(),
            }
        };
        store.save_index(&snapshot).await?;
        debug!(
            documents = snapshot.documents.len(),
            vectors = snapshot.vectors.len(),
            "flushed index"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn index_with(embedder: Arc<dyn Embedder>) -> DocumentIndex {
        DocumentIndex::in_memory(embedder, Metric::Cosine, IndexSettings::default())
    }

    /// Counts texts embedded; fails once `fail_after` texts have been seen.
    struct CountingEmbedder {
        inner: HashingEmbedder,
        seen: AtomicUsize,
        fail_after: usize,
    }

    impl CountingEmbedder {
        fn new(fail_after: usize) -> Self {
            Self {
                inner: HashingEmbedder::new(32),
                seen: AtomicUsize::new(0),
                fail_after,
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            32
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.seen.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
                return Err(IndexError::Embedding("backend down".to_string()));
            }
            self.inner.embed(text).await
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        fn model_name(&self) -> &str {
            "slow"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0; 4])
        }
    }

    /// Returns vectors one component short.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 3])
        }
    }

    #[tokio::test]
    async fn test_index_creates_document_and_vectors() {
        let index = index_with(Arc::new(HashingEmbedder::new(32)));
        let outcome = index
            .index_document("https://a.test/page", "A", "The cat sat on the mat. It was warm.")
            .await
            .unwrap();
        assert_eq!(outcome.chunks_total, 1);
        assert_eq!(outcome.chunks_indexed, 1);

        let doc = index.get_document("https://a.test/page").await.unwrap();
        assert_eq!(doc.title, "A");
        assert_eq!(doc.chunks[0].id, "https://a.test/page-0");
        assert!(index.has_vector("https://a.test/page-0").await);
    }

    #[tokio::test]
    async fn test_empty_content_creates_nothing() {
        let index = index_with(Arc::new(HashingEmbedder::new(32)));
        let err = index
            .index_document("https://a.test/", "Empty", "   \n ")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::EmptyContent));
        assert!(index.get_document("https://a.test/").await.is_none());
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_short_chunks_are_kept_but_not_embedded() {
        let index = DocumentIndex::in_memory(
            Arc::new(HashingEmbedder::new(32)),
            Metric::Cosine,
            IndexSettings {
                max_chunk_size: 20,
                ..IndexSettings::default()
            },
        );
        let outcome = index
            .index_document("https://a.test/", "T", "Tiny. This sentence is long enough.")
            .await
            .unwrap();
        assert_eq!(outcome.chunks_total, 2);
        assert_eq!(outcome.chunks_skipped, 1);
        assert_eq!(outcome.chunks_indexed, 1);
        assert!(!index.has_vector("https://a.test/-0").await);
        assert!(index.has_vector("https://a.test/-1").await);
    }

    #[tokio::test]
    async fn test_reindex_replaces_all_chunks() {
        let index = DocumentIndex::in_memory(
            Arc::new(HashingEmbedder::new(32)),
            Metric::Cosine,
            IndexSettings {
                max_chunk_size: 30,
                ..IndexSettings::default()
            },
        );
        let url = "https://a.test/";
        index
            .index_document(
                url,
                "v1",
                "First sentence is here. Second sentence is here. Third sentence is here.",
            )
            .await
            .unwrap();
        assert_eq!(index.document_vector_count(url).await, 3);

        index
            .index_document(url, "v2", "Only one sentence now.")
            .await
            .unwrap();
        let doc = index.get_document(url).await.unwrap();
        assert_eq!(doc.title, "v2");
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(index.document_vector_count(url).await, 1);
        assert!(!index.has_vector("https://a.test/-1").await);
        assert!(!index.has_vector("https://a.test/-2").await);
    }

    #[tokio::test]
    async fn test_reindex_reuses_unchanged_vectors() {
        let embedder = Arc::new(CountingEmbedder::new(usize::MAX));
        let index = index_with(embedder.clone());
        let text = "A stable paragraph of page text.";
        index.index_document("https://a.test/", "T", text).await.unwrap();
        assert_eq!(embedder.seen.load(Ordering::SeqCst), 1);

        let outcome = index.index_document("https://a.test/", "T", text).await.unwrap();
        assert_eq!(outcome.chunks_reused, 1);
        assert_eq!(embedder.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_reindex_keeps_previous_version() {
        let index = DocumentIndex::in_memory(
            Arc::new(CountingEmbedder::new(1)),
            Metric::Cosine,
            IndexSettings {
                max_chunk_size: 30,
                ..IndexSettings::default()
            },
        );
        let url = "https://a.test/";
        index
            .index_document(url, "v1", "Original page text here.")
            .await
            .unwrap();

        let err = index
            .index_document(url, "v2", "Replacement text number one. Replacement text number two.")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));

        let doc = index.get_document(url).await.unwrap();
        assert_eq!(doc.title, "v1");
        assert_eq!(index.document_vector_count(url).await, 1);
    }

    #[tokio::test]
    async fn test_timeout_commits_nothing() {
        let index = DocumentIndex::in_memory(
            Arc::new(SlowEmbedder),
            Metric::Cosine,
            IndexSettings {
                embed_timeout: Duration::from_millis(20),
                ..IndexSettings::default()
            },
        );
        let err = index
            .index_document("https://a.test/", "T", "Some page text that is long.")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Timeout(_)));
        assert!(index.is_empty().await);
        assert_eq!(index.vector_count().await, 0);
    }

    #[tokio::test]
    async fn test_wrong_dimensionality_is_embedding_error() {
        let index = index_with(Arc::new(ShortEmbedder));
        let err = index
            .index_document("https://a.test/", "T", "Some page text that is long.")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embedding(_)));
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let index = index_with(Arc::new(HashingEmbedder::new(32)));
        index
            .index_document("https://a.test/", "T", "Some page text that is long.")
            .await
            .unwrap();
        assert!(index.delete_page("https://a.test/").await.unwrap());
        assert!(!index.delete_page("https://a.test/").await.unwrap());
        assert!(index.get_document("https://a.test/").await.is_none());
        assert_eq!(index.vector_count().await, 0);
    }

    #[tokio::test]
    async fn test_fragment_urls_share_a_document() {
        let index = index_with(Arc::new(HashingEmbedder::new(32)));
        index
            .index_document("https://a.test/page#intro", "T", "Some page text that is long.")
            .await
            .unwrap();
        assert!(index.get_document("https://a.test/page").await.is_some());
        assert!(index.delete_page("https://a.test/page#other").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_all_empties_everything() {
        let index = index_with(Arc::new(HashingEmbedder::new(32)));
        for i in 0..3 {
            index
                .index_document(&format!("https://a.test/{}", i), "T", "Some page text here.")
                .await
                .unwrap();
        }
        assert_eq!(index.len().await, 3);
        index.clear_all().await.unwrap();
        assert!(index.is_empty().await);
        assert_eq!(index.vector_count().await, 0);
    }

    /// In-memory store whose next `failures` puts are rejected.
    struct FlakyStore {
        inner: InMemoryVectorStore,
        failures: Arc<AtomicUsize>,
    }

    impl VectorStore for FlakyStore {
        fn metric(&self) -> Metric {
            self.inner.metric()
        }
        fn dims(&self) -> Option<usize> {
            self.inner.dims()
        }
        fn len(&self) -> usize {
            self.inner.len()
        }
        fn document_len(&self, url: &str) -> usize {
            self.inner.document_len(url)
        }
        fn put(&mut self, url: &str, chunk_id: &str, vector: Vec<f32>) -> Result<()> {
            let rejected = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if rejected {
                return Err(IndexError::StoreUnavailable("put rejected".to_string()));
            }
            self.inner.put(url, chunk_id, vector)
        }
        fn get(&self, chunk_id: &str) -> Option<&[f32]> {
            self.inner.get(chunk_id)
        }
        fn delete_document(&mut self, url: &str) -> usize {
            self.inner.delete_document(url)
        }
        fn clear(&mut self) {
            self.inner.clear()
        }
        fn score_all(&self, query: &[f32]) -> Result<Vec<crate::store::ScoredChunk>> {
            self.inner.score_all(query)
        }
        fn entries(&self) -> Vec<crate::store::StoredVector> {
            self.inner.entries()
        }
    }

    fn flaky_index() -> (DocumentIndex, Arc<AtomicUsize>) {
        let failures = Arc::new(AtomicUsize::new(0));
        let store = FlakyStore {
            inner: InMemoryVectorStore::new(Metric::Cosine),
            failures: failures.clone(),
        };
        let settings = IndexSettings {
            max_chunk_size: 30,
            ..IndexSettings::default()
        };
        let index = DocumentIndex::new(Arc::new(HashingEmbedder::new(32)), Box::new(store), settings);
        (index, failures)
    }

    const TWO_CHUNKS: &str = "First version sentence one. First version sentence two.";

    #[tokio::test]
    async fn test_failed_insert_restores_previous_vectors() {
        let (index, failures) = flaky_index();
        let url = "https://a.test/";
        index.index_document(url, "v1", TWO_CHUNKS).await.unwrap();
        let before = index.read().await.vectors.entries();
        assert_eq!(before.len(), 2);

        failures.store(1, Ordering::SeqCst);
        let err = index
            .index_document(url, "v2", "Second version text here. And more of it.")
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::StoreUnavailable(_)));

        assert_eq!(index.get_document(url).await.unwrap().title, "v1");
        assert_eq!(index.read().await.vectors.entries(), before);
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_remaining_vectors() {
        let (index, failures) = flaky_index();
        let url = "https://a.test/";
        index.index_document(url, "v1", TWO_CHUNKS).await.unwrap();

        // The new insert and the first restore are both rejected.
        failures.store(2, Ordering::SeqCst);
        assert!(index
            .index_document(url, "v2", "Second version text here. And more of it.")
            .await
            .is_err());

        assert_eq!(index.get_document(url).await.unwrap().title, "v1");
        assert!(!index.has_vector("https://a.test/-0").await);
        assert!(index.has_vector("https://a.test/-1").await);
    }

    #[tokio::test]
    async fn test_concurrent_index_and_delete_leave_no_orphans() {
        let index = Arc::new(index_with(Arc::new(HashingEmbedder::new(32))));
        let mut handles = Vec::new();
        for i in 0..20 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let _ = index
                        .index_document("https://a.test/", "T", &format!("Version {} of the page.", i))
                        .await;
                } else {
                    let _ = index.delete_page("https://a.test/").await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let doc = index.get_document("https://a.test/").await;
        let vectors = index.document_vector_count("https://a.test/").await;
        match doc {
            Some(doc) => assert_eq!(vectors, doc.chunks.len()),
            None => assert_eq!(vectors, 0),
        }
    }
}

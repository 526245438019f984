//! Vector index ownership and rebuild orchestration.
//!
//! The [`IndexManager`] owns the embedding-backed index built from the
//! watched directory's chunks. Rebuilds are wholesale: a detected change
//! produces a brand-new [`VectorIndex`] which is then swapped in as a whole,
//! so a retriever handle fetched before a swap keeps serving a fully-formed
//! (old) index rather than a partially-rebuilt one.
//!
//! At most one rebuild is in flight at a time; concurrent triggers coalesce
//! to a no-op via `try_lock` on the rebuild guard. Rebuild failures never
//! leave the manager without a usable index; it falls back to an empty one.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::{ChunkingConfig, RetrievalConfig};
use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::error::IndexError;
use crate::fingerprint::{self, Snapshot};
use crate::loader;
use crate::models::Chunk;

/// An immutable, embedding-addressable collection of chunks.
///
/// Built from exactly one fingerprint snapshot and replaced (never mutated)
/// on rebuild.
pub struct VectorIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl VectorIndex {
    /// A valid index over no documents. Searches return nothing.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Embed every chunk and build a new index.
    ///
    /// An empty chunk set yields a valid empty index. A single failed
    /// embedding fails the whole build; the caller decides how to degrade.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self, IndexError> {
        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector =
                embedder
                    .embed(&chunk.text)
                    .await
                    .map_err(|e| IndexError::Embedding {
                        path: chunk.source.clone(),
                        source: e,
                    })?;
            entries.push((chunk, vector));
        }
        Ok(Self { entries })
    }

    /// Top-`k` chunks by descending cosine similarity to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Chunk> {
        let mut scored: Vec<(f32, &Chunk)> = self
            .entries
            .iter()
            .map(|(chunk, vector)| (cosine_similarity(query, vector), chunk))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(k)
            .map(|(_, chunk)| chunk.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A query-time handle bound to one index snapshot.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    /// Embed `query` and return the top-`k` most similar chunks, ranked by
    /// non-increasing similarity.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>, IndexError> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(query)
            .await
            .map_err(IndexError::Query)?;
        Ok(self.index.search(&query_vec, k))
    }
}

/// Owns the current [`VectorIndex`] and keeps it consistent with the
/// watched directory.
pub struct IndexManager {
    docs_dir: PathBuf,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    /// Current index; readers clone the Arc and never hold the lock across
    /// retrieval. `None` until the first build.
    current: RwLock<Option<Arc<VectorIndex>>>,
    /// Serializes rebuilds and owns the fingerprint baseline the current
    /// index was built from.
    rebuild: Mutex<Snapshot>,
}

impl IndexManager {
    pub fn new(
        docs_dir: PathBuf,
        chunking: ChunkingConfig,
        retrieval: RetrievalConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            docs_dir,
            chunking,
            retrieval,
            embedder,
            current: RwLock::new(None),
            rebuild: Mutex::new(Snapshot::new()),
        }
    }

    /// Configured number of chunks to retrieve per question.
    pub fn top_k(&self) -> usize {
        self.retrieval.top_k
    }

    /// Scan the watched directory and rebuild the index if its content
    /// changed since the last adopted snapshot.
    ///
    /// Returns whether a rebuild occurred. If another rebuild is already in
    /// flight the call coalesces to a no-op and reports `false`.
    pub async fn check_and_update(&self) -> Result<bool> {
        let mut baseline = match self.rebuild.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(false),
        };

        let (snapshot, changed) = fingerprint::scan(&self.docs_dir, &baseline)?;
        if !changed && self.current.read().await.is_some() {
            return Ok(false);
        }

        self.rebuild_and_swap().await;
        *baseline = snapshot;
        Ok(true)
    }

    /// A retriever bound to the current index at call time.
    ///
    /// Triggers an initial build first if no index exists yet; never returns
    /// an absent retriever.
    pub async fn retriever(&self) -> Result<Retriever> {
        let existing = self.current.read().await.clone();
        let index = match existing {
            Some(index) => index,
            None => {
                let mut baseline = self.rebuild.lock().await;
                // Another task may have completed the initial build while
                // we waited for the guard.
                if self.current.read().await.is_none() {
                    let (snapshot, _) = fingerprint::scan(&self.docs_dir, &baseline)?;
                    self.rebuild_and_swap().await;
                    *baseline = snapshot;
                }
                self.current
                    .read()
                    .await
                    .clone()
                    .unwrap_or_else(|| Arc::new(VectorIndex::empty()))
            }
        };

        Ok(Retriever {
            index,
            embedder: self.embedder.clone(),
        })
    }

    /// Load, split, embed, and atomically swap in the new index. Build
    /// failures degrade to an empty index instead of propagating.
    async fn rebuild_and_swap(&self) {
        let chunks = loader::load_and_split(&self.docs_dir, &self.chunking);
        let chunk_count = chunks.len();

        let index = match VectorIndex::build(chunks, self.embedder.as_ref()).await {
            Ok(index) => {
                info!(chunks = chunk_count, "vector index rebuilt");
                index
            }
            Err(e) => {
                warn!(error = %e, "index rebuild failed, falling back to empty index");
                VectorIndex::empty()
            }
        };

        *self.current.write().await = Some(Arc::new(index));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Deterministic embedder: counts occurrences of a fixed vocabulary.
    struct KeywordEmbedder {
        vocab: Vec<&'static str>,
        delay: Option<Duration>,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                vocab: vec!["sky", "sea", "grass"],
                delay: None,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let lower = text.to_lowercase();
            Ok(self
                .vocab
                .iter()
                .map(|word| lower.matches(word).count() as f32)
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Err(anyhow!("embedding service unreachable"))
        }
    }

    fn manager(dir: &TempDir, embedder: Arc<dyn EmbeddingProvider>) -> IndexManager {
        IndexManager::new(
            dir.path().join("docs"),
            ChunkingConfig::default(),
            RetrievalConfig::default(),
            embedder,
        )
    }

    #[tokio::test]
    async fn test_empty_index_is_usable() {
        let index = VectorIndex::empty();
        assert!(index.is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0], 2).is_empty());
    }

    #[tokio::test]
    async fn test_search_ranks_by_descending_similarity() {
        let embedder = KeywordEmbedder::new();
        let chunks = vec![
            Chunk {
                source: "a.txt".into(),
                text: "The sky is blue. The sky is vast.".to_string(),
                seq: 0,
            },
            Chunk {
                source: "b.txt".into(),
                text: "The sea is deep.".to_string(),
                seq: 0,
            },
            Chunk {
                source: "c.txt".into(),
                text: "The grass is green.".to_string(),
                seq: 0,
            },
        ];
        let index = VectorIndex::build(chunks, &embedder).await.unwrap();

        let query = embedder.embed("what color is the sky").await.unwrap();
        let hits = index.search(&query, 2);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].text.contains("sky"));
    }

    #[tokio::test]
    async fn test_retriever_returns_at_most_k() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(&tmp, Arc::new(KeywordEmbedder::new()));
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "The sky is blue.").unwrap();

        let retriever = mgr.retriever().await.unwrap();
        let hits = retriever.retrieve("sky", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_check_and_update_detects_churn() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(&tmp, Arc::new(KeywordEmbedder::new()));
        let docs = tmp.path().join("docs");

        // Bootstrap: directory missing.
        assert!(mgr.check_and_update().await.unwrap());
        assert!(!mgr.check_and_update().await.unwrap());

        std::fs::write(docs.join("a.txt"), "The sky is blue.").unwrap();
        assert!(mgr.check_and_update().await.unwrap());

        std::fs::write(docs.join("b.txt"), "The sea is deep.").unwrap();
        assert!(mgr.check_and_update().await.unwrap());

        std::fs::remove_file(docs.join("a.txt")).unwrap();
        assert!(mgr.check_and_update().await.unwrap());

        assert!(!mgr.check_and_update().await.unwrap());
    }

    #[tokio::test]
    async fn test_rebuild_failure_falls_back_to_empty_index() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(&tmp, Arc::new(FailingEmbedder));
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "The sky is blue.").unwrap();

        assert!(mgr.check_and_update().await.unwrap());

        // The manager still hands out a usable retriever over the empty
        // fallback index.
        let retriever = mgr.retriever().await.unwrap();
        let hits = retriever.retrieve("sky", 2).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_retriever_snapshot_survives_rebuild() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(&tmp, Arc::new(KeywordEmbedder::new()));
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "The sky is blue.").unwrap();

        let before = mgr.retriever().await.unwrap();

        std::fs::remove_file(docs.join("a.txt")).unwrap();
        std::fs::write(docs.join("b.txt"), "The sea is deep.").unwrap();
        assert!(mgr.check_and_update().await.unwrap());

        // The pre-rebuild handle still serves the pre-rebuild corpus.
        let old_hits = before.retrieve("sky", 2).await.unwrap();
        assert_eq!(old_hits.len(), 1);
        assert!(old_hits[0].text.contains("sky"));

        let after = mgr.retriever().await.unwrap();
        let new_hits = after.retrieve("sea", 2).await.unwrap();
        assert_eq!(new_hits.len(), 1);
        assert!(new_hits[0].text.contains("sea"));
    }

    #[tokio::test]
    async fn test_concurrent_triggers_coalesce() {
        let tmp = TempDir::new().unwrap();
        let mgr = Arc::new(manager(
            &tmp,
            Arc::new(KeywordEmbedder::slow(Duration::from_millis(200))),
        ));
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("a.txt"), "The sky is blue.").unwrap();

        let mgr_bg = mgr.clone();
        let background = tokio::spawn(async move { mgr_bg.check_and_update().await.unwrap() });

        // Give the background rebuild time to take the guard, then trigger
        // again: the second call must coalesce to a no-op.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!mgr.check_and_update().await.unwrap());

        assert!(background.await.unwrap());
    }
}

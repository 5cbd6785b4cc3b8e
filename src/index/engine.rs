//! Indexing engine coordinating chunking, embedding, the in-memory index and its persistence.

use super::chunking::FixedWindowChunker;
use super::storage::{IndexManifest, IndexStorage};
use super::store::{IndexEntry, VectorIndex};
use super::types::{
    Chunk, ChunkingError, IndexError, IndexOutcome, IndexStats, RetrievedChunk, SearchError,
};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fixed parameters of an index, taken from configuration at start-up.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Embedding identity recorded alongside the vectors, as `provider:model`.
    pub embedding_model: String,
    /// Vector dimension produced by the embedding model.
    pub dimension: usize,
    /// Chunker applied to every document.
    pub chunker: FixedWindowChunker,
    /// Number of chunks returned by [`IndexingEngine::search`].
    pub top_k: usize,
}

impl IndexSettings {
    /// Derive settings from configuration.
    ///
    /// The provider is part of the recorded identity: two providers serving the same model name
    /// do not produce comparable vectors.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        Ok(Self {
            embedding_model: format!(
                "{}:{}",
                config.embedding_provider.as_str(),
                config.embedding_model
            ),
            dimension: config.embedding_dimension,
            chunker: FixedWindowChunker::new(
                config.text_splitter_chunk_size,
                config.text_splitter_chunk_overlap,
            )?,
            top_k: config.retrieval_top_k,
        })
    }
}

struct IndexState {
    index: VectorIndex,
    /// Manifest of the persisted copy; `None` until the index has been written.
    manifest: Option<IndexManifest>,
}

/// Owns the vector index and serializes every mutation of it.
///
/// Ingestion and rebuild hold the write lock from chunking through persistence, so only one
/// writer touches the index files at a time. Searches share the read lock.
pub struct IndexingEngine {
    embedding: Arc<dyn EmbeddingClient>,
    storage: IndexStorage,
    settings: IndexSettings,
    state: RwLock<Option<IndexState>>,
}

impl IndexingEngine {
    /// Create an engine with no index. Searches fail until the first ingestion.
    pub fn new(
        embedding: Arc<dyn EmbeddingClient>,
        storage: IndexStorage,
        settings: IndexSettings,
    ) -> Self {
        Self {
            embedding,
            storage,
            settings,
            state: RwLock::new(None),
        }
    }

    /// Create an engine and load the persisted index, if one exists.
    ///
    /// An index written with a different embedding provider, model or dimension is ignored and
    /// replaced by the next ingestion.
    pub async fn open(
        embedding: Arc<dyn EmbeddingClient>,
        storage: IndexStorage,
        settings: IndexSettings,
    ) -> Result<Self, IndexError> {
        let engine = Self::new(embedding, storage, settings);
        match engine.storage.load().await? {
            Some(persisted)
                if persisted.manifest.dimension == engine.settings.dimension
                    && persisted.manifest.embedding_model == engine.settings.embedding_model =>
            {
                let index = VectorIndex::from_entries(engine.settings.dimension, persisted.entries)?;
                tracing::info!(
                    dir = %engine.storage.dir().display(),
                    chunks = index.len(),
                    "Loaded vector index"
                );
                *engine.state.write().await = Some(IndexState {
                    index,
                    manifest: Some(persisted.manifest),
                });
            }
            Some(persisted) => {
                tracing::warn!(
                    persisted_model = %persisted.manifest.embedding_model,
                    persisted_dimension = persisted.manifest.dimension,
                    model = %engine.settings.embedding_model,
                    dimension = engine.settings.dimension,
                    "Ignoring persisted index built with a different embedding configuration"
                );
            }
            None => {
                tracing::info!(dir = %engine.storage.dir().display(), "No persisted vector index");
            }
        }
        Ok(engine)
    }

    /// Settings the engine was built with.
    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Chunk, embed and append documents, skipping chunks already indexed.
    ///
    /// New entries are persisted before this returns. The first ingestion creates the index,
    /// even when the documents produce no chunks.
    pub async fn ingest(&self, documents: &[String]) -> Result<IndexOutcome, IndexError> {
        let mut guard = self.state.write().await;
        let chunks = self.chunk_documents(documents);
        let chunk_count = chunks.len();
        let (fresh, skipped_duplicates) =
            select_new_chunks(chunks, guard.as_ref().map(|state| &state.index));
        let entries = self.embed(fresh).await?;

        let manifest = match guard.as_ref() {
            Some(IndexState {
                manifest: Some(previous),
                ..
            }) => {
                if entries.is_empty() {
                    previous.clone()
                } else {
                    self.storage.append(previous, &entries).await?
                }
            }
            current => {
                let mut all: Vec<IndexEntry> = current
                    .map(|state| state.index.entries().to_vec())
                    .unwrap_or_default();
                all.extend(entries.iter().cloned());
                self.storage
                    .replace(&self.settings.embedding_model, self.settings.dimension, &all)
                    .await?
            }
        };

        let state = guard.get_or_insert_with(|| IndexState {
            index: VectorIndex::new(self.settings.dimension),
            manifest: None,
        });
        let inserted = entries.len();
        for entry in entries {
            state.index.insert(entry)?;
        }
        state.manifest = Some(manifest);

        let outcome = IndexOutcome {
            documents: documents.len(),
            chunks: chunk_count,
            inserted,
            skipped_duplicates,
            total_chunks: state.index.len(),
        };
        tracing::info!(
            documents = outcome.documents,
            chunks = outcome.chunks,
            inserted = outcome.inserted,
            skipped_duplicates = outcome.skipped_duplicates,
            total = outcome.total_chunks,
            "Documents indexed"
        );
        Ok(outcome)
    }

    /// Replace the whole index with the chunks of `documents` and overwrite the persisted copy.
    pub async fn rebuild(&self, documents: &[String]) -> Result<IndexOutcome, IndexError> {
        let mut guard = self.state.write().await;
        let chunks = self.chunk_documents(documents);
        let chunk_count = chunks.len();
        let (fresh, skipped_duplicates) = select_new_chunks(chunks, None);
        let entries = self.embed(fresh).await?;

        let manifest = self
            .storage
            .replace(
                &self.settings.embedding_model,
                self.settings.dimension,
                &entries,
            )
            .await?;
        let index = VectorIndex::from_entries(self.settings.dimension, entries)?;
        let outcome = IndexOutcome {
            documents: documents.len(),
            chunks: chunk_count,
            inserted: index.len(),
            skipped_duplicates,
            total_chunks: index.len(),
        };
        *guard = Some(IndexState {
            index,
            manifest: Some(manifest),
        });

        tracing::info!(
            documents = outcome.documents,
            chunks = outcome.total_chunks,
            "Vector index rebuilt"
        );
        Ok(outcome)
    }

    /// Return the `top_k` chunks most similar to `query`, nearest first.
    pub async fn search(&self, query: &str) -> Result<Vec<RetrievedChunk>, SearchError> {
        if self.state.read().await.is_none() {
            return Err(SearchError::IndexMissing);
        }

        let mut vectors = self
            .embedding
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = vectors.pop().ok_or(SearchError::EmptyEmbedding)?;
        let expected = self.settings.dimension;
        if vector.len() != expected {
            return Err(SearchError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(SearchError::IndexMissing)?;
        let hits = state.index.search(&vector, self.settings.top_k);
        tracing::debug!(
            hits = hits.len(),
            top_k = self.settings.top_k,
            indexed = state.index.len(),
            "Similarity search complete"
        );
        Ok(hits)
    }

    /// Describe the current index, or `None` before the first ingestion.
    pub async fn stats(&self) -> Option<IndexStats> {
        self.state.read().await.as_ref().map(|state| IndexStats {
            chunk_count: state.index.len(),
            dimension: state.index.dimension(),
            embedding_model: self.settings.embedding_model.clone(),
        })
    }

    fn chunk_documents(&self, documents: &[String]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|document| self.settings.chunker.chunk(document))
            .collect()
    }

    async fn embed(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>, IndexError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedding.generate_embeddings(texts).await?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }
        if let Some(vector) = vectors
            .iter()
            .find(|vector| vector.len() != self.settings.dimension)
        {
            return Err(IndexError::DimensionMismatch {
                expected: self.settings.dimension,
                actual: vector.len(),
            });
        }

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                id: chunk.id,
                text: chunk.text,
                vector,
            })
            .collect())
    }
}

/// Keep the first occurrence of each chunk id that is not already indexed.
fn select_new_chunks(chunks: Vec<Chunk>, existing: Option<&VectorIndex>) -> (Vec<Chunk>, usize) {
    let mut seen = HashSet::new();
    let mut fresh = Vec::new();
    let mut skipped = 0;

    for chunk in chunks {
        let indexed = existing.is_some_and(|index| index.contains(&chunk.id));
        if !indexed && seen.insert(chunk.id.clone()) {
            fresh.push(chunk);
        } else {
            skipped += 1;
        }
    }

    (fresh, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProvider;
    use crate::embedding::{EmbeddingClientError, HashEmbeddingClient};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    const DIMENSION: usize = 64;

    fn settings(chunk_size: usize, overlap: usize, top_k: usize) -> IndexSettings {
        IndexSettings {
            embedding_model: "hash".into(),
            dimension: DIMENSION,
            chunker: FixedWindowChunker::new(chunk_size, overlap).expect("chunker"),
            top_k,
        }
    }

    /// Counts how many texts were embedded.
    struct CountingClient {
        inner: HashEmbeddingClient,
        embedded: AtomicUsize,
    }

    impl CountingClient {
        fn new() -> Self {
            Self {
                inner: HashEmbeddingClient::new(DIMENSION),
                embedded: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingClient for CountingClient {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.generate_embeddings(texts).await
        }
    }

    struct FailingClient;

    #[async_trait]
    impl EmbeddingClient for FailingClient {
        async fn generate_embeddings(
            &self,
            _texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Err(EmbeddingClientError::ProviderUnavailable("offline".into()))
        }
    }

    #[tokio::test]
    async fn search_before_ingestion_is_a_precondition_error() {
        let dir = tempdir().expect("tempdir");
        let engine = IndexingEngine::open(
            Arc::new(HashEmbeddingClient::new(DIMENSION)),
            IndexStorage::new(dir.path()),
            settings(100, 20, 4),
        )
        .await
        .expect("open");

        let error = engine.search("anything").await.expect_err("no index");
        assert!(matches!(error, SearchError::IndexMissing));
        assert!(engine.stats().await.is_none());
    }

    #[tokio::test]
    async fn small_index_returns_every_chunk() {
        let dir = tempdir().expect("tempdir");
        let engine = IndexingEngine::new(
            Arc::new(HashEmbeddingClient::new(DIMENSION)),
            IndexStorage::new(dir.path()),
            settings(100, 20, 4),
        );
        engine
            .ingest(&["The sky is blue.".into(), "Grass is green.".into()])
            .await
            .expect("ingest");

        let hits = engine.search("What color is the sky?").await.expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "The sky is blue.");
    }

    #[tokio::test]
    async fn reingesting_the_same_document_embeds_nothing_new() {
        let dir = tempdir().expect("tempdir");
        let client = Arc::new(CountingClient::new());
        let engine = IndexingEngine::new(
            client.clone(),
            IndexStorage::new(dir.path()),
            settings(10, 2, 4),
        );
        let document = "alpha beta gamma delta epsilon".to_string();

        let first = engine.ingest(&[document.clone()]).await.expect("ingest");
        let embedded = client.embedded.load(Ordering::SeqCst);
        let second = engine.ingest(&[document]).await.expect("ingest");

        assert_eq!(first.inserted, first.chunks);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped_duplicates, second.chunks);
        assert_eq!(second.total_chunks, first.total_chunks);
        assert_eq!(client.embedded.load(Ordering::SeqCst), embedded);
    }

    #[tokio::test]
    async fn ingestion_accumulates_and_survives_restart() {
        let dir = tempdir().expect("tempdir");
        let engine = IndexingEngine::new(
            Arc::new(HashEmbeddingClient::new(DIMENSION)),
            IndexStorage::new(dir.path()),
            settings(100, 20, 4),
        );
        engine
            .ingest(&["Invoices are due monthly.".into()])
            .await
            .expect("ingest");
        engine
            .ingest(&["The sky is blue.".into()])
            .await
            .expect("ingest");

        let reopened = IndexingEngine::open(
            Arc::new(HashEmbeddingClient::new(DIMENSION)),
            IndexStorage::new(dir.path()),
            settings(100, 20, 4),
        )
        .await
        .expect("reopen");
        let stats = reopened.stats().await.expect("index present");
        assert_eq!(stats.chunk_count, 2);

        let hits = reopened.search("sky blue").await.expect("search");
        assert_eq!(hits[0].text, "The sky is blue.");
    }

    #[tokio::test]
    async fn rebuild_discards_previous_chunks() {
        let dir = tempdir().expect("tempdir");
        let engine = IndexingEngine::new(
            Arc::new(HashEmbeddingClient::new(DIMENSION)),
            IndexStorage::new(dir.path()),
            settings(100, 20, 4),
        );
        engine
            .ingest(&["Old content about invoices.".into()])
            .await
            .expect("ingest");
        let outcome = engine
            .rebuild(&["Fresh content about the sky.".into()])
            .await
            .expect("rebuild");
        assert_eq!(outcome.total_chunks, 1);

        let hits = engine.search("invoices").await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "Fresh content about the sky.");

        let persisted = IndexStorage::new(dir.path())
            .load()
            .await
            .expect("load")
            .expect("present");
        assert_eq!(persisted.entries.len(), 1);
    }

    #[tokio::test]
    async fn empty_first_ingestion_creates_an_empty_index() {
        let dir = tempdir().expect("tempdir");
        let engine = IndexingEngine::new(
            Arc::new(HashEmbeddingClient::new(DIMENSION)),
            IndexStorage::new(dir.path()),
            settings(100, 20, 4),
        );
        engine.ingest(&[String::new()]).await.expect("ingest");

        assert!(engine.search("sky").await.expect("search").is_empty());
        assert!(dir.path().join("index.json").exists());
    }

    #[tokio::test]
    async fn mismatched_persisted_index_is_ignored_then_replaced() {
        let dir = tempdir().expect("tempdir");
        IndexStorage::new(dir.path())
            .replace(
                "other-model",
                3,
                &[IndexEntry {
                    id: "legacy".into(),
                    text: "legacy".into(),
                    vector: vec![1.0, 0.0, 0.0],
                }],
            )
            .await
            .expect("seed");

        let engine = IndexingEngine::open(
            Arc::new(HashEmbeddingClient::new(DIMENSION)),
            IndexStorage::new(dir.path()),
            settings(100, 20, 4),
        )
        .await
        .expect("open");
        assert!(engine.stats().await.is_none());

        engine
            .ingest(&["The sky is blue.".into()])
            .await
            .expect("ingest");
        let persisted = IndexStorage::new(dir.path())
            .load()
            .await
            .expect("load")
            .expect("present");
        assert_eq!(persisted.manifest.dimension, DIMENSION);
        assert_eq!(persisted.entries.len(), 1);
    }

    #[tokio::test]
    async fn index_from_another_embedding_provider_is_not_reused() {
        let dir = tempdir().expect("tempdir");
        let hash_config = Config {
            embedding_provider: EmbeddingProvider::Hash,
            ..Config::default()
        };
        let engine = IndexingEngine::new(
            Arc::new(HashEmbeddingClient::new(hash_config.embedding_dimension)),
            IndexStorage::new(dir.path()),
            IndexSettings::from_config(&hash_config).expect("settings"),
        );
        engine
            .ingest(&["The sky is blue.".into()])
            .await
            .expect("ingest");
        let stats = engine.stats().await.expect("index present");
        assert_eq!(stats.embedding_model, "hash:all-minilm");

        let ollama_config = Config {
            embedding_provider: EmbeddingProvider::Ollama,
            ..Config::default()
        };
        let reopened = IndexingEngine::open(
            Arc::new(HashEmbeddingClient::new(ollama_config.embedding_dimension)),
            IndexStorage::new(dir.path()),
            IndexSettings::from_config(&ollama_config).expect("settings"),
        )
        .await
        .expect("reopen");
        assert!(reopened.stats().await.is_none());

        let same = IndexingEngine::open(
            Arc::new(HashEmbeddingClient::new(hash_config.embedding_dimension)),
            IndexStorage::new(dir.path()),
            IndexSettings::from_config(&hash_config).expect("settings"),
        )
        .await
        .expect("reopen");
        assert_eq!(same.stats().await.map(|stats| stats.chunk_count), Some(1));
    }

    #[tokio::test]
    async fn embedding_failure_leaves_no_index_behind() {
        let dir = tempdir().expect("tempdir");
        let engine = IndexingEngine::new(
            Arc::new(FailingClient),
            IndexStorage::new(dir.path()),
            settings(100, 20, 4),
        );

        let error = engine
            .ingest(&["The sky is blue.".into()])
            .await
            .expect_err("embedding failure");
        assert!(matches!(error, IndexError::Embedding(_)));
        assert!(engine.stats().await.is_none());
        assert!(!dir.path().join("index.json").exists());
    }
}

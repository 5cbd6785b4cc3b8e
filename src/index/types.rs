//! Data types and error definitions for the vector index.

use crate::embedding::EmbeddingClientError;
use serde::Serialize;
use thiserror::Error;

/// Errors produced while configuring the chunker.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunk size of zero cannot make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for the window to advance.
    #[error("chunk overlap {overlap} must be smaller than chunk size {chunk_size}")]
    InvalidOverlap {
        /// Configured window length.
        chunk_size: usize,
        /// Configured overlap.
        overlap: usize,
    },
}

/// Errors raised while updating or persisting the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding provider failed to produce vectors for new chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Provider returned a different number of vectors than chunks submitted.
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    EmbeddingCountMismatch {
        /// Number of chunks submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// A vector's length differs from the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// Reading or writing the persisted index failed.
    #[error("Index storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Persisted index could not be encoded or decoded.
    #[error("Index serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Persisted index is internally inconsistent.
    #[error("Persisted index is corrupt: {0}")]
    Corrupt(String),
}

/// Errors emitted while answering a similarity query.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Retrieval was attempted before any index was built or loaded.
    #[error("No vector index available; ingest documents before querying")]
    IndexMissing,
    /// Embedding provider failed to return vectors for the query text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Query embedding dimension does not match the index.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the index.
        expected: usize,
        /// Dimension of the query vector.
        actual: usize,
    },
    /// Embedding provider returned no vectors.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
}

/// Contiguous window of a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Content digest used as the chunk identity.
    pub id: String,
    /// Window text.
    pub text: String,
    /// First character offset (inclusive).
    pub start: usize,
    /// Last character offset (exclusive).
    pub end: usize,
}

/// Chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    /// Chunk identity.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Summary of an ingestion or rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexOutcome {
    /// Documents submitted.
    pub documents: usize,
    /// Chunks produced by the chunker.
    pub chunks: usize,
    /// Chunks newly added to the index.
    pub inserted: usize,
    /// Chunks already present (in the index or earlier in the batch).
    pub skipped_duplicates: usize,
    /// Index size after the operation.
    pub total_chunks: usize,
}

/// Description of the current index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Number of stored chunks.
    pub chunk_count: usize,
    /// Vector dimension.
    pub dimension: usize,
    /// Embedding model the vectors came from.
    pub embedding_model: String,
}

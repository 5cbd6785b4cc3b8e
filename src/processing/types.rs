//! Request and error types shared by the pipeline stages.

use crate::{
    embedding::EmbeddingClientError,
    generation::GenerationClientError,
    index::{ChunkingError, IndexError, SearchError},
    parsing::ExtractionError,
    protocol::{ChatTurn, MessageKind},
};
use thiserror::Error;

/// Errors emitted by the question-answering pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage received an envelope type it does not handle.
    #[error("{stage} cannot handle {kind} envelopes")]
    UnsupportedType {
        /// Stage that rejected the envelope.
        stage: &'static str,
        /// Type of the rejected envelope.
        kind: MessageKind,
    },
    /// A recognized document could not be read.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Chunker configuration was invalid.
    #[error("Invalid chunking configuration: {0}")]
    Chunking(#[from] ChunkingError),
    /// Updating or persisting the index failed.
    #[error("Failed to index documents: {0}")]
    Index(#[from] IndexError),
    /// Retrieval failed.
    #[error("Failed to retrieve context: {0}")]
    Search(#[from] SearchError),
    /// Embedding client could not be constructed.
    #[error("Embedding client unavailable: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Answer generation failed.
    #[error("Failed to generate answer: {0}")]
    Generation(#[from] GenerationClientError),
    /// A blocking worker task panicked or was cancelled.
    #[error("Background worker failed: {0}")]
    Worker(String),
}

/// Input to one question-answering run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineRequest {
    /// Files to ingest, in upload order.
    pub file_paths: Vec<String>,
    /// Question to answer.
    pub query: String,
    /// Prior chat turns, oldest first.
    pub history: Vec<ChatTurn>,
}

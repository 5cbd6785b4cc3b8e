//! Vector index: chunking, embedding, similarity search and on-disk persistence.

pub mod chunking;
mod engine;
pub mod storage;
pub mod store;
pub mod types;

pub use chunking::{FixedWindowChunker, chunk_id};
pub use engine::{IndexSettings, IndexingEngine};
pub use storage::{IndexManifest, IndexStorage, PersistedIndex};
pub use store::{IndexEntry, VectorIndex};
pub use types::{
    Chunk, ChunkingError, IndexError, IndexOutcome, IndexStats, RetrievedChunk, SearchError,
};

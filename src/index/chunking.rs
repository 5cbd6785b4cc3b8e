//! Fixed-size overlapping character windows.
//!
//! Chunks are contiguous character ranges of a document. Window `i` starts at
//! `i * (chunk_size - overlap)` and ends at `min(start + chunk_size, len)`; splitting stops after
//! the first window that reaches the end of the text. Offsets count Unicode scalar values, so a
//! window never splits a character.

use super::types::{Chunk, ChunkingError};
use sha2::{Digest, Sha256};

/// Splits text into overlapping windows of a fixed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedWindowChunker {
    /// Validate and build a chunker. `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                chunk_size,
                overlap,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Target window length in characters.
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by neighbouring windows.
    pub const fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into windows. Whitespace-only windows are dropped.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = boundaries.len() - 1;
        let step = self.chunk_size - self.overlap;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            let window = &text[boundaries[start]..boundaries[end]];
            if !window.trim().is_empty() {
                chunks.push(Chunk {
                    id: chunk_id(window),
                    text: window.to_string(),
                    start,
                    end,
                });
            }
            if end == char_count {
                break;
            }
            start += step;
        }
        chunks
    }
}

/// Stable identity of a chunk: the lowercase hex SHA-256 digest of its text.
pub fn chunk_id(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

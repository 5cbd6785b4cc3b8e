//! In-memory vector index with exact cosine search.

use super::types::{IndexError, RetrievedChunk};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stored chunk with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Chunk identity.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// Insertion-ordered collection of embedded chunks keyed by chunk identity.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
    positions: HashMap<String, usize>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Rebuild an index from persisted entries, rejecting duplicates and foreign dimensions.
    pub fn from_entries(dimension: usize, entries: Vec<IndexEntry>) -> Result<Self, IndexError> {
        let mut index = Self::new(dimension);
        for entry in entries {
            let id = entry.id.clone();
            if !index.insert(entry)? {
                return Err(IndexError::Corrupt(format!("duplicate chunk id {id}")));
            }
        }
        Ok(index)
    }

    /// Vector dimension accepted by the index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a chunk with this identity is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Stored entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append an entry. Returns `false` (and leaves the index unchanged) when the id is present.
    pub fn insert(&mut self, entry: IndexEntry) -> Result<bool, IndexError> {
        if entry.vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: entry.vector.len(),
            });
        }
        if self.positions.contains_key(&entry.id) {
            return Ok(false);
        }
        self.positions.insert(entry.id.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(true)
    }

    /// Return up to `k` entries ordered by descending cosine similarity to `query`.
    ///
    /// Equal scores keep insertion order, so results are deterministic for a given index.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let query_norm = norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, cosine(query, query_norm, &entry.vector)))
            .collect();
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        scored
            .into_iter()
            .take(k)
            .map(|(position, score)| {
                let entry = &self.entries[position];
                RetrievedChunk {
                    id: entry.id.clone(),
                    text: entry.text.clone(),
                    score,
                }
            })
            .collect()
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, candidate: &[f32]) -> f32 {
    let candidate_norm = norm(candidate);
    if query_norm == 0.0 || candidate_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
    dot / (query_norm * candidate_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            text: format!("text {id}"),
            vector,
        }
    }

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new(2);
        index.insert(entry("east", vec![1.0, 0.0])).expect("insert");
        index.insert(entry("north", vec![0.0, 1.0])).expect("insert");
        index.insert(entry("north-east", vec![1.0, 1.0])).expect("insert");
        index
    }

    #[test]
    fn search_orders_nearest_first() {
        let index = sample_index();
        let hits = index.search(&[0.9, 0.1], 3);
        let ids: Vec<_> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["east", "north-east", "north"]);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[test]
    fn search_returns_everything_when_k_exceeds_size() {
        let index = sample_index();
        assert_eq!(index.search(&[1.0, 0.0], 4).len(), 3);
        assert!(VectorIndex::new(2).search(&[1.0, 0.0], 4).is_empty());
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut index = VectorIndex::new(2);
        index.insert(entry("first", vec![1.0, 0.0])).expect("insert");
        index.insert(entry("second", vec![2.0, 0.0])).expect("insert");
        index.insert(entry("third", vec![3.0, 0.0])).expect("insert");
        let ids: Vec<_> = index
            .search(&[1.0, 0.0], 3)
            .into_iter()
            .map(|hit| hit.id)
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let mut index = sample_index();
        let inserted = index.insert(entry("east", vec![0.5, 0.5])).expect("insert");
        assert!(!inserted);
        assert_eq!(index.len(), 3);
        assert_eq!(index.entries()[0].vector, vec![1.0, 0.0]);
    }

    #[test]
    fn foreign_dimensions_are_rejected() {
        let mut index = VectorIndex::new(3);
        let error = index
            .insert(entry("short", vec![1.0]))
            .expect_err("dimension mismatch");
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn from_entries_rejects_duplicates() {
        let error = VectorIndex::from_entries(
            1,
            vec![entry("a", vec![1.0]), entry("a", vec![1.0])],
        )
        .expect_err("duplicate");
        assert!(matches!(error, IndexError::Corrupt(_)));
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_parsed: AtomicU64,
    chunks_indexed: AtomicU64,
    queries_answered: AtomicU64,
    index_rebuilds: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a parsed upload batch.
    pub fn record_parsed(&self, document_count: u64) {
        self.documents_parsed
            .fetch_add(document_count, Ordering::Relaxed);
    }

    /// Record chunks newly written to the index.
    pub fn record_indexed(&self, chunk_count: u64) {
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a completed question/answer round trip.
    pub fn record_answer(&self) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an explicit index rebuild.
    pub fn record_rebuild(&self) {
        self.index_rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_parsed: self.documents_parsed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            index_rebuilds: self.index_rebuilds.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of uploaded documents parsed since startup.
    pub documents_parsed: u64,
    /// Chunks written to the index since startup.
    pub chunks_indexed: u64,
    /// Questions answered since startup.
    pub queries_answered: u64,
    /// Explicit index rebuilds since startup.
    pub index_rebuilds: u64,
}

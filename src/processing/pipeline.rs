//! Orchestrator running the three stages for one question.

use super::{
    answer::AnswerStage,
    ingestion::IngestionStage,
    retrieval::RetrievalStage,
    types::{PipelineError, PipelineRequest},
};
use crate::{
    config::Config,
    embedding::build_embedding_client,
    generation::build_generation_client,
    index::{IndexOutcome, IndexSettings, IndexStats, IndexStorage, IndexingEngine},
    metrics::{MetricsSnapshot, PipelineMetrics},
    parsing,
    protocol::{Envelope, INGESTION_STAGE, MessageBody, UI, UploadPayload},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::Instrument;

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Ingest the files and answer the question, returning the `ANSWERED` envelope.
    async fn process(&self, request: PipelineRequest) -> Result<Envelope, PipelineError>;

    /// Replace the index with the contents of the files.
    async fn rebuild(&self, file_paths: Vec<String>) -> Result<IndexOutcome, PipelineError>;

    /// Describe the current index, if one exists.
    async fn index_stats(&self) -> Option<IndexStats>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs ingestion, retrieval and answer composition in sequence.
///
/// Build one pipeline near process start and share it through an `Arc`; the stages hold the
/// long-lived embedding and generation clients and the index.
pub struct Pipeline {
    ingestion: IngestionStage,
    retrieval: RetrievalStage,
    answer: AnswerStage,
    metrics: Arc<PipelineMetrics>,
}

impl Pipeline {
    /// Assemble a pipeline from explicitly constructed stages.
    pub fn new(ingestion: IngestionStage, retrieval: RetrievalStage, answer: AnswerStage) -> Self {
        Self {
            ingestion,
            retrieval,
            answer,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Wire the stages from configuration, loading any persisted index.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedding = build_embedding_client(config)?;
        tracing::info!(provider = ?config.generation_provider, "Initializing generation client");
        let generation = build_generation_client(config)?;

        let settings = IndexSettings::from_config(config)?;
        tracing::debug!(
            chunk_size = settings.chunker.chunk_size(),
            overlap = settings.chunker.overlap(),
            top_k = settings.top_k,
            dimension = settings.dimension,
            "Derived index settings"
        );
        let engine = IndexingEngine::open(
            embedding,
            IndexStorage::new(&config.vector_store_dir),
            settings,
        )
        .await?;

        Ok(Self::new(
            IngestionStage::new(),
            RetrievalStage::new(Arc::new(engine)),
            AnswerStage::new(generation),
        ))
    }

    /// Answer one question about the given files.
    ///
    /// The first failing stage aborts the run; its error is returned and no envelope is produced.
    pub async fn run(&self, request: PipelineRequest) -> Result<Envelope, PipelineError> {
        let PipelineRequest {
            file_paths,
            query,
            history,
        } = request;
        let upload = Envelope::new(
            UI,
            INGESTION_STAGE,
            MessageBody::Upload(UploadPayload {
                file_paths,
                query,
                history,
            }),
        );
        let span = tracing::info_span!("pipeline", trace_id = %upload.trace_id());

        self.run_stages(upload).instrument(span).await
    }

    async fn run_stages(&self, upload: Envelope) -> Result<Envelope, PipelineError> {
        let ingestion = self.ingestion;
        let parsed = tokio::task::spawn_blocking(move || ingestion.handle(upload))
            .await
            .map_err(|error| PipelineError::Worker(error.to_string()))??;
        if let MessageBody::Parsed(payload) = parsed.body() {
            self.metrics.record_parsed(payload.documents.len() as u64);
        }

        let (retrieved, outcome) = self.retrieval.process(parsed).await?;
        self.metrics.record_indexed(outcome.inserted as u64);

        let answered = self.answer.handle(retrieved).await?;
        self.metrics.record_answer();
        tracing::info!("Pipeline run complete");
        Ok(answered)
    }

    /// Parse the files and rebuild the index from them alone.
    pub async fn rebuild(&self, file_paths: Vec<String>) -> Result<IndexOutcome, PipelineError> {
        let documents = tokio::task::spawn_blocking(move || parsing::extract_all(&file_paths))
            .await
            .map_err(|error| PipelineError::Worker(error.to_string()))??;
        self.metrics.record_parsed(documents.len() as u64);

        let outcome = self.retrieval.engine().rebuild(&documents).await?;
        self.metrics.record_rebuild();
        self.metrics.record_indexed(outcome.inserted as u64);
        Ok(outcome)
    }

    /// Describe the current index.
    pub async fn index_stats(&self) -> Option<IndexStats> {
        self.retrieval.engine().stats().await
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl PipelineApi for Pipeline {
    async fn process(&self, request: PipelineRequest) -> Result<Envelope, PipelineError> {
        Pipeline::run(self, request).await
    }

    async fn rebuild(&self, file_paths: Vec<String>) -> Result<IndexOutcome, PipelineError> {
        Pipeline::rebuild(self, file_paths).await
    }

    async fn index_stats(&self) -> Option<IndexStats> {
        Pipeline::index_stats(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        Pipeline::metrics_snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingProvider, GenerationProvider};
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_requires_a_gemini_key() {
        let dir = tempdir().expect("tempdir");
        let config = Config {
            vector_store_dir: dir.path().to_path_buf(),
            embedding_provider: EmbeddingProvider::Hash,
            generation_provider: GenerationProvider::Gemini,
            gemini_api_key: None,
            ..Config::default()
        };

        let error = Pipeline::from_config(&config)
            .await
            .err()
            .expect("missing key");
        assert!(matches!(error, PipelineError::Generation(_)));
    }

    #[tokio::test]
    async fn from_config_rejects_invalid_chunking() {
        let dir = tempdir().expect("tempdir");
        let config = Config {
            vector_store_dir: dir.path().to_path_buf(),
            generation_provider: GenerationProvider::Ollama,
            text_splitter_chunk_size: 10,
            text_splitter_chunk_overlap: 10,
            ..Config::default()
        };

        let error = Pipeline::from_config(&config)
            .await
            .err()
            .expect("invalid overlap");
        assert!(matches!(error, PipelineError::Chunking(_)));
    }

    #[tokio::test]
    async fn from_config_starts_without_an_index() {
        let dir = tempdir().expect("tempdir");
        let config = Config {
            vector_store_dir: dir.path().join("store"),
            generation_provider: GenerationProvider::Ollama,
            ..Config::default()
        };

        let pipeline = Pipeline::from_config(&config).await.expect("pipeline");
        assert!(pipeline.index_stats().await.is_none());
        assert_eq!(pipeline.metrics_snapshot(), MetricsSnapshot::default());
    }
}

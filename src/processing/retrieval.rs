//! Indexing and retrieval stage: `PARSED` in, `RETRIEVED` out.

use super::types::PipelineError;
use crate::index::{IndexOutcome, IndexingEngine};
use crate::protocol::{
    ANSWER_STAGE, Envelope, MessageBody, ParsedPayload, RETRIEVAL_STAGE, RetrievedPayload,
};
use std::sync::Arc;

/// Adds parsed documents to the index and looks up context for the question.
#[derive(Clone)]
pub struct RetrievalStage {
    engine: Arc<IndexingEngine>,
}

impl RetrievalStage {
    /// Wrap a shared indexing engine.
    pub fn new(engine: Arc<IndexingEngine>) -> Self {
        Self { engine }
    }

    /// Engine backing the stage.
    pub fn engine(&self) -> &Arc<IndexingEngine> {
        &self.engine
    }

    /// Ingest the parsed documents and reply with the best-matching chunk texts.
    pub async fn handle(&self, envelope: Envelope) -> Result<Envelope, PipelineError> {
        self.process(envelope).await.map(|(reply, _)| reply)
    }

    /// Same as [`RetrievalStage::handle`], also reporting what ingestion added.
    pub(crate) async fn process(
        &self,
        envelope: Envelope,
    ) -> Result<(Envelope, IndexOutcome), PipelineError> {
        let MessageBody::Parsed(ParsedPayload {
            documents,
            query,
            history,
        }) = envelope.body()
        else {
            return Err(PipelineError::UnsupportedType {
                stage: RETRIEVAL_STAGE,
                kind: envelope.kind(),
            });
        };

        let outcome = self.engine.ingest(documents).await?;
        let hits = self.engine.search(query).await?;
        tracing::info!(
            trace_id = envelope.trace_id(),
            retrieved = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Retrieved context"
        );

        let reply = envelope.reply(
            RETRIEVAL_STAGE,
            ANSWER_STAGE,
            MessageBody::Retrieved(RetrievedPayload {
                retrieved_context: hits.into_iter().map(|hit| hit.text).collect(),
                query: query.clone(),
                history: history.clone(),
            }),
        );
        Ok((reply, outcome))
    }
}

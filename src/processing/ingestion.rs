//! Parsing dispatcher stage: `UPLOAD` in, `PARSED` out.

use super::types::PipelineError;
use crate::parsing;
use crate::protocol::{
    Envelope, INGESTION_STAGE, MessageBody, ParsedPayload, RETRIEVAL_STAGE, UploadPayload,
};

/// Turns uploaded files into plain text.
///
/// Extraction is synchronous file I/O; the pipeline runs this stage on a blocking worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestionStage;

impl IngestionStage {
    /// Create the stage.
    pub fn new() -> Self {
        Self
    }

    /// Extract every uploaded file and reply with one text per path, in upload order.
    pub fn handle(&self, envelope: Envelope) -> Result<Envelope, PipelineError> {
        let MessageBody::Upload(UploadPayload {
            file_paths,
            query,
            history,
        }) = envelope.body()
        else {
            return Err(PipelineError::UnsupportedType {
                stage: INGESTION_STAGE,
                kind: envelope.kind(),
            });
        };

        let documents = parsing::extract_all(file_paths)?;
        tracing::info!(
            trace_id = envelope.trace_id(),
            files = file_paths.len(),
            "Parsed uploaded files"
        );

        Ok(envelope.reply(
            INGESTION_STAGE,
            RETRIEVAL_STAGE,
            MessageBody::Parsed(ParsedPayload {
                documents,
                query: query.clone(),
                history: history.clone(),
            }),
        ))
    }
}

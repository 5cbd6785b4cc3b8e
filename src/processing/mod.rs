//! Question-answering pipeline: parsing, retrieval and answer stages plus their orchestrator.
//!
//! Each stage consumes one [`crate::protocol::Envelope`] and replies with the next:
//! `UPLOAD` → [`IngestionStage`] → `PARSED` → [`RetrievalStage`] → `RETRIEVED` →
//! [`AnswerStage`] → `ANSWERED`.

mod answer;
mod ingestion;
mod pipeline;
mod retrieval;
pub mod types;

pub use answer::{AnswerStage, compose_prompt};
pub use ingestion::IngestionStage;
pub use pipeline::{Pipeline, PipelineApi};
pub use retrieval::RetrievalStage;
pub use types::{PipelineError, PipelineRequest};

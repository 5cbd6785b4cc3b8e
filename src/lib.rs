#![deny(missing_docs)]

//! Core library for the Rusty RAG document question-answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Text-generation client abstraction and adapters.
pub mod generation;
/// Chunking, vector search and index persistence.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document text extraction.
pub mod parsing;
/// Question-answering pipeline stages and orchestrator.
pub mod processing;
/// Inter-stage message envelope.
pub mod protocol;

//! HTTP surface for Rusty RAG.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /process` – Multipart upload of one or more `files` parts plus a `query` text part and
//!   an optional `history` part (JSON array of `{query, answer}`). Files are saved under
//!   `UPLOAD_DIR`, run through the pipeline, and the final `ANSWERED` envelope is returned.
//! - `POST /rebuild` – Multipart `files`; replaces the vector index with their contents.
//! - `GET /index` – Describe the current vector index, or report that none exists yet.
//! - `GET /metrics` – Observe pipeline counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::config::get_config;
use crate::index::IndexStats;
use crate::processing::{PipelineApi, PipelineError, PipelineRequest};
use crate::protocol::{ChatTurn, Envelope};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the question-answering API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/process", post(process_upload::<S>))
        .route("/rebuild", post(rebuild_index::<S>))
        .route("/index", get(get_index::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

/// Parts collected from a multipart upload.
#[derive(Default)]
struct UploadForm {
    file_paths: Vec<String>,
    query: Option<String>,
    history: Option<String>,
}

/// Save every `files` part under the upload directory and collect the text parts.
async fn read_upload(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let upload_dir = &get_config().upload_dir;
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("files") => {
                let file_name = field
                    .file_name()
                    .and_then(|name| Path::new(name).file_name())
                    .map(|name| name.to_os_string())
                    .ok_or_else(|| {
                        AppError::BadRequest("file part is missing a file name".into())
                    })?;
                let bytes = field.bytes().await?;
                tokio::fs::create_dir_all(upload_dir).await?;
                let destination = upload_dir.join(&file_name);
                tokio::fs::write(&destination, &bytes).await?;
                tracing::debug!(
                    path = %destination.display(),
                    bytes = bytes.len(),
                    "Saved uploaded file"
                );
                form.file_paths
                    .push(destination.to_string_lossy().into_owned());
            }
            Some("query") => form.query = Some(field.text().await?),
            Some("history") => form.history = Some(field.text().await?),
            other => {
                tracing::debug!(field = ?other, "Ignoring unexpected multipart field");
            }
        }
    }

    Ok(form)
}

fn parse_history(raw: Option<&str>) -> Result<Vec<ChatTurn>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|error| AppError::BadRequest(format!("invalid history: {error}"))),
    }
}

/// Answer a question about the uploaded files.
///
/// The response body is the `ANSWERED` envelope, including its `trace_id`.
async fn process_upload<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<Envelope>, AppError>
where
    S: PipelineApi,
{
    let form = read_upload(multipart).await?;
    let query = form
        .query
        .filter(|query| !query.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("query is required".into()))?;
    if form.file_paths.is_empty() {
        return Err(AppError::BadRequest("at least one file is required".into()));
    }
    let history = parse_history(form.history.as_deref())?;

    let files = form.file_paths.len();
    let envelope = service
        .process(PipelineRequest {
            file_paths: form.file_paths,
            query,
            history,
        })
        .await?;
    tracing::info!(
        trace_id = envelope.trace_id(),
        files,
        "Process request completed"
    );
    Ok(Json(envelope))
}

/// Success response for `POST /rebuild`.
#[derive(Serialize)]
struct RebuildResponse {
    documents: usize,
    chunks_indexed: usize,
    skipped_duplicates: usize,
}

/// Rebuild the index from the uploaded files alone.
async fn rebuild_index<S>(
    State(service): State<Arc<S>>,
    multipart: Multipart,
) -> Result<Json<RebuildResponse>, AppError>
where
    S: PipelineApi,
{
    let form = read_upload(multipart).await?;
    if form.file_paths.is_empty() {
        return Err(AppError::BadRequest("at least one file is required".into()));
    }

    let outcome = service.rebuild(form.file_paths).await?;
    tracing::info!(
        documents = outcome.documents,
        chunks = outcome.total_chunks,
        "Rebuild request completed"
    );
    Ok(Json(RebuildResponse {
        documents: outcome.documents,
        chunks_indexed: outcome.total_chunks,
        skipped_duplicates: outcome.skipped_duplicates,
    }))
}

/// Response body for `GET /index`.
#[derive(Serialize)]
struct IndexResponse {
    present: bool,
    #[serde(flatten)]
    stats: Option<IndexStats>,
}

async fn get_index<S>(State(service): State<Arc<S>>) -> Json<IndexResponse>
where
    S: PipelineApi,
{
    let stats = service.index_stats().await;
    Json(IndexResponse {
        present: stats.is_some(),
        stats,
    })
}

/// Return pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "process",
                method: "POST",
                path: "/process",
                description: "Upload documents as multipart `files` with a `query` and an optional `history` part; returns the ANSWERED envelope { sender, receiver, type, trace_id, payload: { query, answer, sources } }. `history` must be a JSON array of { \"query\", \"answer\" } objects; Python-literal lists (single quotes) are rejected with 400.",
                request_example: Some(json!({
                    "files": ["report.pdf", "notes.txt"],
                    "query": "What color is the sky?",
                    "history": [{ "query": "Hi", "answer": "Hello" }]
                })),
            },
            CommandDescriptor {
                name: "rebuild",
                method: "POST",
                path: "/rebuild",
                description: "Replace the vector index with the contents of the uploaded multipart `files`.",
                request_example: Some(json!({ "files": ["handbook.docx"] })),
            },
            CommandDescriptor {
                name: "index",
                method: "GET",
                path: "/index",
                description: "Describe the vector index: chunk count, dimension and embedding model, or { \"present\": false }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return pipeline counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

enum AppError {
    BadRequest(String),
    Upload(std::io::Error),
    Pipeline(PipelineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            Self::Upload(error) => {
                tracing::error!(error = %error, "Failed to store uploaded file");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
            }
            Self::Pipeline(error) => {
                tracing::error!(error = %error, "Pipeline run failed");
                (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
            }
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        Self::BadRequest(inner.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(inner: std::io::Error) -> Self {
        Self::Upload(inner)
    }
}

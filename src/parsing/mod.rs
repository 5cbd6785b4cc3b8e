//! File-format dispatch and text extraction.
//!
//! Uploaded files are routed by extension (case-insensitive) to a thin extractor over an
//! existing parsing crate. Unknown extensions do not fail a batch: they yield the placeholder
//! `"Unsupported file format: <path>"` so the remaining files are still ingested.

mod ooxml;
mod pdf;
mod tabular;

use std::path::Path;
use thiserror::Error;

/// Failure while extracting text from a file with a recognized extension.
#[derive(Debug, Error)]
#[error("Failed to extract text from {path}: {kind}")]
pub struct ExtractionError {
    /// File that could not be read.
    pub path: String,
    /// Underlying failure.
    #[source]
    pub kind: ExtractionErrorKind,
}

/// Underlying cause of an [`ExtractionError`].
#[derive(Debug, Error)]
pub enum ExtractionErrorKind {
    /// File could not be read from disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// PDF structure could not be loaded.
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    /// Office document archive was unreadable.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// Office document XML was malformed.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// CSV content was malformed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Document formats understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Paginated document (`.pdf`).
    Pdf,
    /// Word-processing document (`.docx`).
    Docx,
    /// Slide deck (`.pptx`).
    Pptx,
    /// Comma-separated table (`.csv`).
    Csv,
    /// Plain or lightweight-markup text (`.txt`, `.md`).
    PlainText,
}

impl DocumentFormat {
    /// Select a format from the path's extension, ignoring case.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "csv" => Some(Self::Csv),
            "txt" | "md" => Some(Self::PlainText),
            _ => None,
        }
    }
}

/// Placeholder text emitted for files whose extension has no extractor.
pub fn unsupported_placeholder(path: &str) -> String {
    format!("Unsupported file format: {path}")
}

/// Extract the text of a single file.
///
/// Unknown extensions produce [`unsupported_placeholder`]; extractor failures for known formats
/// are returned as [`ExtractionError`].
pub fn extract_text(path: &str) -> Result<String, ExtractionError> {
    let file_path = Path::new(path);
    let Some(format) = DocumentFormat::from_path(file_path) else {
        tracing::warn!(path, "Unsupported file format; substituting placeholder");
        return Ok(unsupported_placeholder(path));
    };

    let extracted = match format {
        DocumentFormat::Pdf => pdf::extract(file_path),
        DocumentFormat::Docx => ooxml::extract_docx(file_path),
        DocumentFormat::Pptx => ooxml::extract_pptx(file_path),
        DocumentFormat::Csv => tabular::extract_csv(file_path),
        DocumentFormat::PlainText => std::fs::read_to_string(file_path).map_err(Into::into),
    };

    match extracted {
        Ok(text) => {
            tracing::debug!(path, ?format, chars = text.chars().count(), "Extracted text");
            Ok(text)
        }
        Err(kind) => Err(ExtractionError {
            path: path.to_string(),
            kind,
        }),
    }
}

/// Extract every file in order, one text per path.
pub fn extract_all(paths: &[String]) -> Result<Vec<String>, ExtractionError> {
    paths.iter().map(|path| extract_text(path)).collect()
}

use super::ExtractionErrorKind;
use lopdf::Document;
use std::path::Path;

/// Concatenate the text of every page in page order.
///
/// Pages whose text cannot be decoded contribute an empty string rather than failing the file.
pub(super) fn extract(path: &Path) -> Result<String, ExtractionErrorKind> {
    let document = Document::load(path)?;
    let mut text = String::new();

    for page_number in document.get_pages().keys() {
        match document.extract_text(&[*page_number]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(error) => {
                tracing::debug!(
                    path = %path.display(),
                    page = page_number,
                    error = %error,
                    "Page yielded no text"
                );
            }
        }
    }

    Ok(text)
}

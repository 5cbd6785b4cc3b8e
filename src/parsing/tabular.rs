use super::ExtractionErrorKind;
use std::path::Path;

/// Render each CSV record as `field, field, …` with one record per line.
///
/// Every row is treated as data (no header row) and rows may differ in length.
pub(super) fn extract_csv(path: &Path) -> Result<String, ExtractionErrorKind> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().collect::<Vec<_>>().join(", "));
    }
    Ok(rows.join("\n"))
}

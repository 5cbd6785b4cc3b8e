//! Durable persistence for the vector index.
//!
//! The index lives in one directory as two files:
//!
//! - `index.json`: manifest with the embedding model, dimension, chunk count and the number of
//!   committed bytes in the blob.
//! - `index.jsonl`: append-only blob, one JSON `{id, text, vector}` record per line.
//!
//! Only bytes counted by the manifest are trusted. An append first truncates the blob to the
//! committed length (dropping a torn tail from an interrupted write), appends and syncs the new
//! records, and then swaps in a new manifest with a rename. A missing manifest means no index
//! has been built yet.

use super::store::IndexEntry;
use super::types::IndexError;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// File name of the index manifest.
pub const MANIFEST_FILE: &str = "index.json";
/// File name of the append-only chunk blob.
pub const BLOB_FILE: &str = "index.jsonl";

const FORMAT_VERSION: u32 = 1;

/// Metadata describing a persisted index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Layout version of the files.
    pub format_version: u32,
    /// Embedding model that produced the vectors.
    pub embedding_model: String,
    /// Vector dimension.
    pub dimension: usize,
    /// Number of committed records.
    pub chunk_count: usize,
    /// Number of committed bytes at the start of the blob.
    pub blob_bytes: u64,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
}

/// Manifest plus the committed entries read back from disk.
#[derive(Debug, Clone)]
pub struct PersistedIndex {
    /// Manifest describing the entries.
    pub manifest: IndexManifest,
    /// Entries in insertion order.
    pub entries: Vec<IndexEntry>,
}

/// Handle on the directory that holds the persisted index.
#[derive(Debug, Clone)]
pub struct IndexStorage {
    dir: PathBuf,
}

impl IndexStorage {
    /// Use `dir` for the manifest and blob. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the index files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Path of the blob file.
    pub fn blob_path(&self) -> PathBuf {
        self.dir.join(BLOB_FILE)
    }

    /// Read the persisted index. Returns `Ok(None)` when no manifest exists.
    pub async fn load(&self) -> Result<Option<PersistedIndex>, IndexError> {
        let manifest_bytes = match fs::read(self.manifest_path()).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let manifest: IndexManifest = serde_json::from_slice(&manifest_bytes)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported index format version {}",
                manifest.format_version
            )));
        }

        let blob = match fs::read(self.blob_path()).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound && manifest.blob_bytes == 0 => {
                Vec::new()
            }
            Err(error) => return Err(error.into()),
        };
        let committed = usize::try_from(manifest.blob_bytes)
            .ok()
            .and_then(|len| blob.get(..len))
            .ok_or_else(|| {
                IndexError::Corrupt(format!(
                    "blob holds {} bytes but manifest commits {}",
                    blob.len(),
                    manifest.blob_bytes
                ))
            })?;

        let entries = serde_json::Deserializer::from_slice(committed)
            .into_iter::<IndexEntry>()
            .collect::<Result<Vec<_>, _>>()?;
        if entries.len() != manifest.chunk_count {
            return Err(IndexError::Corrupt(format!(
                "manifest lists {} chunks but blob holds {}",
                manifest.chunk_count,
                entries.len()
            )));
        }

        tracing::debug!(
            dir = %self.dir.display(),
            chunks = entries.len(),
            model = %manifest.embedding_model,
            "Loaded persisted index"
        );
        Ok(Some(PersistedIndex { manifest, entries }))
    }

    /// Append entries after the committed records described by `previous`.
    pub async fn append(
        &self,
        previous: &IndexManifest,
        entries: &[IndexEntry],
    ) -> Result<IndexManifest, IndexError> {
        fs::create_dir_all(&self.dir).await?;
        let encoded = encode_entries(entries)?;

        let mut blob = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.blob_path())
            .await?;
        blob.set_len(previous.blob_bytes).await?;
        blob.seek(SeekFrom::Start(previous.blob_bytes)).await?;
        blob.write_all(&encoded).await?;
        blob.sync_all().await?;

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: previous.embedding_model.clone(),
            dimension: previous.dimension,
            chunk_count: previous.chunk_count + entries.len(),
            blob_bytes: previous.blob_bytes + encoded.len() as u64,
            updated_at: current_timestamp_rfc3339(),
        };
        self.write_manifest(&manifest).await?;
        tracing::debug!(
            appended = entries.len(),
            total = manifest.chunk_count,
            "Appended index records"
        );
        Ok(manifest)
    }

    /// Overwrite the persisted index with exactly `entries`.
    ///
    /// The old manifest is removed first, so an interrupted replace leaves "no index" rather
    /// than a manifest describing the wrong blob.
    pub async fn replace(
        &self,
        embedding_model: &str,
        dimension: usize,
        entries: &[IndexEntry],
    ) -> Result<IndexManifest, IndexError> {
        fs::create_dir_all(&self.dir).await?;
        match fs::remove_file(self.manifest_path()).await {
            Ok(()) => {}
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }

        let encoded = encode_entries(entries)?;
        let staging = self.dir.join(format!("{BLOB_FILE}.tmp"));
        let mut blob = fs::File::create(&staging).await?;
        blob.write_all(&encoded).await?;
        blob.sync_all().await?;
        drop(blob);
        fs::rename(&staging, self.blob_path()).await?;

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: embedding_model.to_string(),
            dimension,
            chunk_count: entries.len(),
            blob_bytes: encoded.len() as u64,
            updated_at: current_timestamp_rfc3339(),
        };
        self.write_manifest(&manifest).await?;
        tracing::debug!(
            dir = %self.dir.display(),
            chunks = entries.len(),
            "Replaced persisted index"
        );
        Ok(manifest)
    }

    async fn write_manifest(&self, manifest: &IndexManifest) -> Result<(), IndexError> {
        let staging = self.dir.join(format!("{MANIFEST_FILE}.tmp"));
        let bytes = serde_json::to_vec_pretty(manifest)?;
        let mut file = fs::File::create(&staging).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&staging, self.manifest_path()).await?;
        Ok(())
    }
}

fn encode_entries(entries: &[IndexEntry]) -> Result<Vec<u8>, serde_json::Error> {
    let mut encoded = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut encoded, entry)?;
        encoded.push(b'\n');
    }
    Ok(encoded)
}

/// Current timestamp formatted for the manifest.
fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(id: &str) -> IndexEntry {
        IndexEntry {
            id: id.into(),
            text: format!("chunk {id}"),
            vector: vec![0.25, -0.5],
        }
    }

    #[tokio::test]
    async fn missing_manifest_means_no_index() {
        let dir = tempdir().expect("tempdir");
        let storage = IndexStorage::new(dir.path().join("vector_store"));
        assert!(storage.load().await.expect("load").is_none());
    }

    #[tokio::test]
    async fn replace_then_append_round_trips() {
        let dir = tempdir().expect("tempdir");
        let storage = IndexStorage::new(dir.path());

        let manifest = storage
            .replace("all-minilm", 2, &[entry("a"), entry("b")])
            .await
            .expect("replace");
        assert_eq!(manifest.chunk_count, 2);

        let manifest = storage
            .append(&manifest, &[entry("c")])
            .await
            .expect("append");
        assert_eq!(manifest.chunk_count, 3);
        assert!(manifest.updated_at.contains('T'));

        let loaded = storage.load().await.expect("load").expect("present");
        assert_eq!(loaded.manifest, manifest);
        let ids: Vec<_> = loaded.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(loaded.entries[2], entry("c"));
    }

    #[tokio::test]
    async fn uncommitted_tail_is_ignored_and_overwritten() {
        let dir = tempdir().expect("tempdir");
        let storage = IndexStorage::new(dir.path());
        let manifest = storage
            .replace("all-minilm", 2, &[entry("a")])
            .await
            .expect("replace");

        // Simulate a crash after writing part of a record.
        let mut blob = OpenOptions::new()
            .append(true)
            .open(storage.blob_path())
            .await
            .expect("open blob");
        blob.write_all(b"{\"id\":\"torn").await.expect("write");
        blob.flush().await.expect("flush");
        drop(blob);

        let loaded = storage.load().await.expect("load").expect("present");
        assert_eq!(loaded.entries.len(), 1);

        storage
            .append(&manifest, &[entry("b")])
            .await
            .expect("append");
        let loaded = storage.load().await.expect("load").expect("present");
        let ids: Vec<_> = loaded.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn replace_discards_previous_records() {
        let dir = tempdir().expect("tempdir");
        let storage = IndexStorage::new(dir.path());
        storage
            .replace("all-minilm", 2, &[entry("old-1"), entry("old-2")])
            .await
            .expect("replace");
        storage
            .replace("all-minilm", 2, &[entry("new")])
            .await
            .expect("replace");

        let loaded = storage.load().await.expect("load").expect("present");
        assert_eq!(loaded.entries, vec![entry("new")]);
        assert!(!dir.path().join(format!("{BLOB_FILE}.tmp")).exists());
    }

    #[tokio::test]
    async fn truncated_blob_is_corrupt() {
        let dir = tempdir().expect("tempdir");
        let storage = IndexStorage::new(dir.path());
        storage
            .replace("all-minilm", 2, &[entry("a"), entry("b")])
            .await
            .expect("replace");
        std::fs::write(storage.blob_path(), b"").expect("truncate blob");

        let error = storage.load().await.expect_err("corrupt");
        assert!(matches!(error, IndexError::Corrupt(_)));
    }
}

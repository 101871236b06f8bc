//! On-disk snapshots for [`BasicVectorDb`](crate::BasicVectorDb).
//!
//! Each knowledge base lives in one JSON file at
//! `<storage_directory>/vector_storage/<kb_id>.json`. The path is a pure
//! function of those two values; nothing tracks open stores process-wide.

use std::path::{Path, PathBuf};

use kbstore_core::{ChunkMetadata, KbError};
use serde::{Deserialize, Serialize};

/// Version tag written into every snapshot.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Subdirectory of the storage root that holds vector snapshots.
pub const VECTOR_STORAGE_DIR: &str = "vector_storage";

/// Full persisted state of one store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub kb_id: String,
    pub dimension: Option<usize>,
    pub vectors: Vec<Vec<f32>>,
    pub metadata: Vec<ChunkMetadata>,
}

/// Borrowed form of [`Snapshot`] so saving does not clone the row set.
#[derive(Serialize)]
pub(crate) struct SnapshotRef<'a> {
    pub format_version: u32,
    pub kb_id: &'a str,
    pub dimension: Option<usize>,
    pub vectors: &'a [Vec<f32>],
    pub metadata: &'a [ChunkMetadata],
}

/// Expand a leading `~` to `$HOME`. Other paths are returned unchanged.
pub fn expand_home(dir: &str) -> PathBuf {
    let Some(home) = std::env::var_os("HOME") else {
        return PathBuf::from(dir);
    };

    if dir == "~" {
        PathBuf::from(home)
    } else if let Some(rest) = dir.strip_prefix("~/") {
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(dir)
    }
}

/// Check that `kb_id` can be used as a single file name.
pub fn validate_kb_id(kb_id: &str) -> Result<(), KbError> {
    if kb_id.is_empty() {
        return Err(KbError::Config("kb_id must not be empty".to_string()));
    }
    if kb_id == "." || kb_id == ".." || kb_id.contains(['/', '\\']) {
        return Err(KbError::Config(format!(
            "kb_id '{kb_id}' must not contain path separators or be '.'/'..'"
        )));
    }
    Ok(())
}

/// Deterministic snapshot location for `(storage_directory, kb_id)`.
pub fn vector_storage_path(storage_directory: &str, kb_id: &str) -> PathBuf {
    expand_home(storage_directory)
        .join(VECTOR_STORAGE_DIR)
        .join(format!("{kb_id}.json"))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `snapshot` to `path`, creating parent directories. The bytes go to
/// a sibling temp file first and are renamed into place.
pub(crate) async fn write_snapshot(path: &Path, snapshot: &SnapshotRef<'_>) -> Result<(), KbError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            KbError::Io(format!("failed to create directory {}: {e}", parent.display()))
        })?;
    }

    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| KbError::Serialization(format!("failed to encode snapshot: {e}")))?;

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| KbError::Io(format!("failed to write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| KbError::Io(format!("failed to move snapshot into {}: {e}", path.display())))
}

/// Read the snapshot at `path`. A missing file yields `Ok(None)`.
pub async fn read_snapshot(path: &Path) -> Result<Option<Snapshot>, KbError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(KbError::Io(format!(
                "failed to read {}: {e}",
                path.display()
            )))
        }
    };

    let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
        KbError::Serialization(format!("failed to parse {}: {e}", path.display()))
    })?;

    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(KbError::Serialization(format!(
            "unsupported snapshot format version {} in {}",
            snapshot.format_version,
            path.display()
        )));
    }
    if snapshot.vectors.len() != snapshot.metadata.len() {
        return Err(KbError::Serialization(format!(
            "corrupt snapshot {}: {} vectors but {} metadata items",
            path.display(),
            snapshot.vectors.len(),
            snapshot.metadata.len()
        )));
    }

    Ok(Some(snapshot))
}

/// Remove the snapshot at `path`. Returns whether a file was removed.
pub async fn remove_snapshot(path: &Path) -> Result<bool, KbError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(KbError::Io(format!(
            "failed to remove {}: {e}",
            path.display()
        ))),
    }
}

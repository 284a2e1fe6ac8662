// File-based persistence
//
// All server state lives under {data_root}/.blueprint/ as versioned JSON
// documents. Writes go through a temp file plus rename so an interrupted
// process never leaves a half-written document behind.

pub mod cache_ops;
pub mod journeys;

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Current on-disk schema version, stored in every document
pub const STORAGE_VERSION: u32 = 1;

/// Result type for file storage operations
pub type FileResult<T> = Result<T, String>;

/// Get the .blueprint state directory for a data root
pub fn blueprint_dir(root: &Path) -> PathBuf {
    root.join(".blueprint")
}

/// Create a directory (and any missing parents) if it does not exist
pub fn ensure_dir(path: &Path) -> FileResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory '{}': {}", path.display(), e))?;
    }
    Ok(())
}

/// Write contents to a temp file, then rename it into place
pub fn atomic_write(path: &Path, contents: &str) -> FileResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| format!("No parent directory for '{}'", path.display()))?;
    ensure_dir(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("Invalid file name in '{}'", path.display()))?;
    let tmp_path = parent.join(format!("{}.tmp", file_name));

    fs::write(&tmp_path, contents)
        .map_err(|e| format!("Failed to write temp file '{}': {}", tmp_path.display(), e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        format!(
            "Failed to move '{}' into place as '{}': {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })
}

/// Read and deserialize a JSON document
pub fn read_json<T: DeserializeOwned>(path: &Path) -> FileResult<T> {
    let contents = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", path.display(), e))
}

/// Serialize and atomically write a JSON document
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> FileResult<()> {
    let contents = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize '{}': {}", path.display(), e))?;
    atomic_write(path, &contents)
}

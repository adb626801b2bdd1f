//! JSON persistence helpers
//!
//! Loading tolerates a missing file; saving goes through a temp file and a
//! rename so a crash mid-write never leaves a truncated document behind.

use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{IoOperation, StorageError, StorageResult};

/// Load JSON from a file path, `None` if the file does not exist
pub fn load_json<T, P>(path: P) -> StorageResult<Option<T>>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| StorageError::io(path, IoOperation::Read, e))?;
    let value = serde_json::from_str(&content).map_err(|e| StorageError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(Some(value))
}

/// Save value as JSON atomically (write to temp, then rename)
pub fn save_json_atomic<T, P>(path: P, value: &T) -> StorageResult<()>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::io(parent, IoOperation::Write, e))?;
        }
    }

    let content = serde_json::to_string_pretty(value).map_err(|e| StorageError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, &content)
        .map_err(|e| StorageError::io(&temp_path, IoOperation::Write, e))?;
    std::fs::rename(&temp_path, path).map_err(|e| StorageError::io(path, IoOperation::Move, e))?;

    Ok(())
}

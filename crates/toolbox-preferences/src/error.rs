//! Error types for the preferences module

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreferenceError {
    #[error("Unknown theme: {0} (expected light, dark, or system)")]
    InvalidTheme(String),

    #[error("Storage error: {0}")]
    Storage(#[from] toolbox_storage::StorageError),
}

pub type Result<T> = std::result::Result<T, PreferenceError>;

//! Storage error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// File read/write failed
    #[error("IO error on {path} ({operation}): {source}")]
    IoError {
        path: PathBuf,
        operation: IoOperation,
        source: std::io::Error,
    },

    /// Stored document could not be parsed
    #[error("Failed to parse {path} as json: {message}")]
    ParseError { path: PathBuf, message: String },

    /// Value under a key could not be encoded or decoded
    #[error("Invalid value for key '{key}': {source}")]
    InvalidValue {
        key: String,
        source: serde_json::Error,
    },
}

/// IO operation type for error context
#[derive(Debug, Clone, Copy)]
pub enum IoOperation {
    Read,
    Write,
    Move,
}

impl std::fmt::Display for IoOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoOperation::Read => write!(f, "read"),
            IoOperation::Write => write!(f, "write"),
            IoOperation::Move => write!(f, "move"),
        }
    }
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, operation: IoOperation, source: std::io::Error) -> Self {
        StorageError::IoError {
            path: path.into(),
            operation,
            source,
        }
    }
}

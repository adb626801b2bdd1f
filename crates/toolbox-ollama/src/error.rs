//! Error types for the Ollama backend

use thiserror::Error;
use toolbox_models::TransportError;
use toolbox_storage::StorageError;

/// Errors that can occur while talking to an Ollama server
#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Model pull failed: {0}")]
    PullFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, OllamaError>;

impl From<reqwest::Error> for OllamaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OllamaError::Timeout(err.to_string())
        } else if err.is_decode() {
            OllamaError::InvalidResponse(err.to_string())
        } else {
            OllamaError::NetworkError(err.to_string())
        }
    }
}

impl From<OllamaError> for TransportError {
    fn from(err: OllamaError) -> Self {
        match err {
            OllamaError::NetworkError(_) | OllamaError::Timeout(_) => {
                TransportError::Unreachable(err.to_string())
            }
            OllamaError::ConfigError(msg) | OllamaError::InvalidArguments(msg) => {
                TransportError::InvalidArguments(msg)
            }
            OllamaError::PullFailed(msg) => TransportError::Rejected(msg),
            OllamaError::Http { .. }
            | OllamaError::InvalidResponse(_)
            | OllamaError::Storage(_) => {
                TransportError::Rejected(err.to_string())
            }
        }
    }
}

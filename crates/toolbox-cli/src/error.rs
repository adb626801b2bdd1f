// CLI error types

use thiserror::Error;

use toolbox_config::ConfigError;
use toolbox_models::ModelSyncError;
use toolbox_ollama::OllamaError;
use toolbox_preferences::PreferenceError;
use toolbox_storage::StorageError;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Backend error: {0}")]
    Backend(#[from] OllamaError),

    #[error(transparent)]
    Model(#[from] ModelSyncError),

    #[error(transparent)]
    Preference(#[from] PreferenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            CliError::InvalidArgument { message } => {
                format!("Invalid argument: {}\n\nRun 'toolbox --help' for usage information.", message)
            }
            CliError::Config(e) => {
                format!("Configuration error: {}\n\nRun 'toolbox config show' to check your configuration.", e)
            }
            CliError::Storage(e) => {
                format!("Storage error: {}\n\nCheck the storage.data_dir setting.", e)
            }
            CliError::Backend(e) => {
                format!("Ollama backend error: {}", e)
            }
            CliError::Model(ModelSyncError::InvalidModelName(msg)) => {
                format!("Invalid model name: {}", msg)
            }
            CliError::Model(e) if e.is_transient() => {
                format!("{}\n\nIs Ollama running? Check with 'toolbox status'.", e)
            }
            CliError::Model(e) => e.to_string(),
            CliError::Preference(e) => e.to_string(),
            CliError::Internal(msg) => {
                format!("Internal error: {}\n\nPlease report this issue.", msg)
            }
        }
    }

    /// Get technical details for verbose mode
    pub fn technical_details(&self) -> String {
        format!("{:?}", self)
    }
}

impl From<tokio::task::JoinError> for CliError {
    fn from(err: tokio::task::JoinError) -> Self {
        CliError::Internal(format!("background task failed: {}", err))
    }
}

pub type CliResult<T> = Result<T, CliError>;

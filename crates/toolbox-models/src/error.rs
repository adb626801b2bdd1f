//! Error types for model synchronization

use thiserror::Error;

/// Failure reported by the command transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The remote manager received the command and refused or failed it
    #[error("{0}")]
    Rejected(String),

    /// The remote manager does not know the command
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The remote manager could not be reached
    #[error("Remote manager unreachable: {0}")]
    Unreachable(String),

    /// The command arguments did not have the expected shape
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Errors that can occur while synchronizing model state
#[derive(Debug, Error)]
pub enum ModelSyncError {
    #[error("Command '{command}' failed: {source}")]
    Command {
        command: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Invalid response to '{command}': {source}")]
    Decode {
        command: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid model name: {0}")]
    InvalidModelName(String),

    #[error("Storage error: {0}")]
    Storage(#[from] toolbox_storage::StorageError),
}

impl ModelSyncError {
    /// Name of the remote command that failed, if any
    pub fn command(&self) -> Option<&'static str> {
        match self {
            ModelSyncError::Command { command, .. } | ModelSyncError::Decode { command, .. } => {
                Some(*command)
            }
            _ => None,
        }
    }

    /// Whether this failure came from a read-only refresh
    ///
    /// Refresh failures leave the last known state in place and heal on the
    /// next fetch; everything else is a failed mutation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.command(),
            Some(crate::commands::GET_MODELS)
                | Some(crate::commands::GET_RUNNING_MODELS)
                | Some(crate::commands::GET_GPU_INFO)
                | Some(crate::commands::CHECK_CONNECTION)
        )
    }
}

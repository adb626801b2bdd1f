//! Command gateway to the remote model manager
//!
//! [`CommandTransport`] is the abstract asynchronous call primitive; the
//! gateway adds one typed method per remote capability on top of it. The
//! gateway only shapes arguments and decodes responses: it never retries and
//! never swallows a failure. That policy belongs to callers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use toolbox_storage::TokenStat;

use crate::{
    error::{ModelSyncError, TransportError},
    models::{GpuReport, ModelDescriptor, RunningModelDescriptor},
    Result,
};

/// Remote command names
pub mod commands {
    pub const GET_MODELS: &str = "get_models";
    pub const GET_RUNNING_MODELS: &str = "get_running_models";
    pub const GET_GPU_INFO: &str = "get_gpu_info";
    pub const PULL_MODEL: &str = "pull_model";
    pub const DELETE_MODEL: &str = "delete_model";
    pub const START_MODEL: &str = "start_model";
    pub const UNLOAD_MODEL: &str = "unload_model";
    pub const UPDATE_OLLAMA_CONFIG: &str = "update_ollama_config";
    pub const CHECK_CONNECTION: &str = "check_connection";
    pub const RECORD_TOKENS: &str = "record_tokens";
    pub const GET_TOKEN_STATS: &str = "get_token_stats";
    pub const CLEAR_ALL_DATA: &str = "clear_all_data";
}

/// Asynchronous request/response channel to the remote manager
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Invoke `command` with JSON `args`; `Value::Null` means "no arguments"
    async fn call(&self, command: &str, args: Value) -> std::result::Result<Value, TransportError>;
}

/// Typed facade over a [`CommandTransport`]
#[derive(Clone)]
pub struct CommandGateway {
    transport: Arc<dyn CommandTransport>,
}

impl CommandGateway {
    pub fn new(transport: Arc<dyn CommandTransport>) -> Self {
        Self { transport }
    }

    /// List installed models
    pub async fn get_models(&self) -> Result<Vec<ModelDescriptor>> {
        self.query(commands::GET_MODELS, Value::Null).await
    }

    /// List models resident in GPU memory
    pub async fn get_running_models(&self) -> Result<Vec<RunningModelDescriptor>> {
        self.query(commands::GET_RUNNING_MODELS, Value::Null).await
    }

    /// GPU name and memory usage, in mebibytes
    pub async fn get_gpu_info(&self) -> Result<GpuReport> {
        self.query(commands::GET_GPU_INFO, Value::Null).await
    }

    /// Download a model; resolves once the pull has finished
    pub async fn pull_model(&self, name: &str) -> Result<()> {
        self.execute(commands::PULL_MODEL, json!({ "name": name })).await
    }

    pub async fn delete_model(&self, name: &str) -> Result<()> {
        self.execute(commands::DELETE_MODEL, json!({ "name": name })).await
    }

    /// Load a model into GPU memory and keep it resident
    pub async fn start_model(&self, name: &str) -> Result<()> {
        self.execute(commands::START_MODEL, json!({ "name": name })).await
    }

    /// Evict a model from GPU memory
    pub async fn unload_model(&self, name: &str) -> Result<()> {
        self.execute(commands::UNLOAD_MODEL, json!({ "name": name })).await
    }

    /// Point the remote manager at a different inference server endpoint
    pub async fn update_ollama_config(&self, endpoint: &str) -> Result<()> {
        self.execute(commands::UPDATE_OLLAMA_CONFIG, json!({ "endpoint": endpoint }))
            .await
    }

    /// Whether the inference server behind the manager answers
    pub async fn check_connection(&self) -> Result<bool> {
        self.query(commands::CHECK_CONNECTION, Value::Null).await
    }

    /// Add token usage of `model` on `date` (`YYYY-MM-DD`) to the usage ledger
    pub async fn record_tokens(
        &self,
        date: &str,
        prompt: u64,
        completion: u64,
        model: &str,
    ) -> Result<()> {
        self.execute(
            commands::RECORD_TOKENS,
            json!({ "date": date, "prompt": prompt, "completion": completion, "model": model }),
        )
        .await
    }

    /// Token totals per date, oldest first
    pub async fn get_token_stats(&self) -> Result<Vec<TokenStat>> {
        self.query(commands::GET_TOKEN_STATS, Value::Null).await
    }

    /// Erase all application data kept by the remote manager
    pub async fn clear_all_data(&self) -> Result<()> {
        self.execute(commands::CLEAR_ALL_DATA, Value::Null).await
    }

    async fn invoke(&self, command: &'static str, args: Value) -> Result<Value> {
        debug!("Invoking remote command: {}", command);
        self.transport
            .call(command, args)
            .await
            .map_err(|source| ModelSyncError::Command { command, source })
    }

    async fn query<T: DeserializeOwned>(&self, command: &'static str, args: Value) -> Result<T> {
        let value = self.invoke(command, args).await?;
        serde_json::from_value(value).map_err(|source| ModelSyncError::Decode { command, source })
    }

    async fn execute(&self, command: &'static str, args: Value) -> Result<()> {
        self.invoke(command, args).await.map(|_| ())
    }
}

impl std::fmt::Debug for CommandGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGateway").finish_non_exhaustive()
    }
}

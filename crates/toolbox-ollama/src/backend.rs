//! Ollama HTTP backend
//!
//! Maps the remote-manager command set onto the Ollama REST API:
//!
//! | command | request |
//! |---|---|
//! | `get_models` | `GET /api/tags` |
//! | `get_running_models` | `GET /api/ps` |
//! | `get_gpu_info` | [`GpuProbe`] |
//! | `pull_model` | `POST /api/pull` (streamed, lines re-emitted as `pull-progress`) |
//! | `delete_model` | `DELETE /api/delete` |
//! | `start_model` | `POST /api/generate` with `keep_alive: -1` |
//! | `unload_model` | `POST /api/generate` with `keep_alive: 0` |
//! | `update_ollama_config` | swaps the base URL |
//! | `check_connection` | `GET /` |
//! | `record_tokens` | appends to the [`TokenLedger`] |
//! | `get_token_stats` | per-date totals from the [`TokenLedger`] |
//! | `clear_all_data` | empties the [`TokenLedger`] |
//!
//! The ledger is local to the backend, in memory unless one backed by durable
//! storage is supplied with [`OllamaBackend::with_token_ledger`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use toolbox_models::{
    commands, CommandTransport, EventHandler, EventHub, EventSource, GpuReport, Subscription,
    TransportError, PULL_PROGRESS_TOPIC,
};
use toolbox_storage::{MemoryStore, TokenLedger, TokenUsage};

use crate::{
    error::OllamaError,
    gpu::{GpuProbe, NoGpuProbe},
    Result,
};

/// Endpoint of a locally running Ollama server
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Default timeout for Ollama API requests (30 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default pool idle timeout (90 seconds)
const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Default TCP keep-alive interval (60 seconds)
const DEFAULT_TCP_KEEPALIVE_SECS: u64 = 60;

/// Health check timeout (5 seconds)
const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Upper bound for a streamed pull; large models take hours on slow links
const PULL_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Remote model manager backed by an Ollama server
pub struct OllamaBackend {
    client: Arc<Client>,
    base_url: RwLock<String>,
    timeout: Duration,
    events: EventHub,
    gpu: Arc<dyn GpuProbe>,
    ledger: TokenLedger,
}

impl OllamaBackend {
    /// Create a backend with the default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a backend with a custom request timeout
    ///
    /// # Errors
    /// Returns `ConfigError` if `base_url` is empty or not an http(s) URL
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;

        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT_SECS))
            .tcp_keepalive(Duration::from_secs(DEFAULT_TCP_KEEPALIVE_SECS))
            .build()
            .map_err(|e| OllamaError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            base_url: RwLock::new(base_url),
            timeout,
            events: EventHub::new(),
            gpu: Arc::new(NoGpuProbe),
            ledger: TokenLedger::new(Arc::new(MemoryStore::new())),
        })
    }

    /// Use `probe` to answer `get_gpu_info`
    pub fn with_gpu_probe(mut self, probe: Arc<dyn GpuProbe>) -> Self {
        self.gpu = probe;
        self
    }

    /// Keep token usage in `ledger`
    pub fn with_token_ledger(mut self, ledger: TokenLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Hub on which pull progress is published
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Point subsequent requests at `endpoint`
    pub fn set_base_url(&self, endpoint: &str) -> Result<()> {
        let normalized = normalize_base_url(endpoint)?;
        info!("Ollama endpoint changed to {}", normalized);
        *self.base_url.write() = normalized;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.read(), path)
    }

    /// Installed models, passed through verbatim from `/api/tags`
    pub async fn list_models(&self) -> Result<Vec<Value>> {
        debug!("Listing installed models");
        let response = self.client.get(self.url("/api/tags")).send().await?;
        let body: Value = ensure_success(response).await?.json().await?;
        models_field(body)
    }

    /// Models resident in memory, passed through verbatim from `/api/ps`
    pub async fn list_running_models(&self) -> Result<Vec<Value>> {
        debug!("Listing running models");
        let response = self.client.get(self.url("/api/ps")).send().await?;
        let body: Value = ensure_success(response).await?.json().await?;
        models_field(body)
    }

    /// Pull a model, emitting each streamed status line as `pull-progress`
    ///
    /// Resolves once the stream ends. A line carrying an `error` field fails
    /// the pull.
    pub async fn pull_model(&self, name: &str) -> Result<()> {
        info!("Pulling model: {}", name);
        let response = self
            .client
            .post(self.url("/api/pull"))
            .timeout(Duration::from_secs(PULL_TIMEOUT_SECS))
            .json(&json!({ "name": name, "stream": true }))
            .send()
            .await?;
        let mut response = ensure_success(response).await?;

        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            pending.extend_from_slice(&chunk);
            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                self.handle_pull_line(&line)?;
            }
        }
        self.handle_pull_line(&pending)?;

        info!("Successfully pulled model: {}", name);
        Ok(())
    }

    fn handle_pull_line(&self, line: &[u8]) -> Result<()> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse pull response line: {}", e);
                return Ok(());
            }
        };

        if let Some(message) = value.get("error").and_then(Value::as_str) {
            error!("Pull reported an error: {}", message);
            return Err(OllamaError::PullFailed(message.to_string()));
        }

        self.events.emit(PULL_PROGRESS_TOPIC, progress_payload(&value));
        Ok(())
    }

    pub async fn delete_model(&self, name: &str) -> Result<()> {
        debug!("Deleting model: {}", name);
        let response = self
            .client
            .delete(self.url("/api/delete"))
            .json(&json!({ "name": name }))
            .send()
            .await?;
        ensure_success(response).await?;
        info!("Deleted model: {}", name);
        Ok(())
    }

    /// Load a model and keep it resident indefinitely
    pub async fn start_model(&self, name: &str) -> Result<()> {
        self.generate_keep_alive(name, -1).await
    }

    /// Evict a model from memory
    pub async fn unload_model(&self, name: &str) -> Result<()> {
        self.generate_keep_alive(name, 0).await
    }

    async fn generate_keep_alive(&self, name: &str, keep_alive: i64) -> Result<()> {
        debug!("Setting keep_alive={} for {}", keep_alive, name);
        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&json!({ "model": name, "keep_alive": keep_alive }))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    /// Whether the server answers on its root endpoint; never fails
    pub async fn health_check(&self) -> bool {
        let url = self.url("/");
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) => {
                let healthy = response.status().is_success();
                if !healthy {
                    warn!("Ollama health check failed: HTTP {}", response.status());
                }
                healthy
            }
            Err(e) => {
                warn!("Ollama health check failed: {}", e);
                false
            }
        }
    }

    /// GPU report from the configured probe, zeroed when unavailable
    pub async fn gpu_report(&self) -> GpuReport {
        self.gpu.probe().await.unwrap_or_default()
    }

    /// Record token usage arguments `{date, prompt, completion, model}`
    pub fn record_tokens(&self, args: &Value) -> Result<()> {
        let usage = TokenUsage::new(
            non_empty_arg(args, "date")?,
            count_arg(args, "prompt")?,
            count_arg(args, "completion")?,
            non_empty_arg(args, "model")?,
        );
        self.ledger.record(usage)?;
        Ok(())
    }

    async fn dispatch(&self, command: &str, args: &Value) -> Result<Value> {
        match command {
            commands::GET_MODELS => Ok(Value::Array(self.list_models().await?)),
            commands::GET_RUNNING_MODELS => Ok(Value::Array(self.list_running_models().await?)),
            commands::GET_GPU_INFO => serde_json::to_value(self.gpu_report().await)
                .map_err(|e| OllamaError::InvalidResponse(e.to_string())),
            commands::PULL_MODEL => self.pull_model(string_arg(args, "name")?).await.map(|_| Value::Null),
            commands::DELETE_MODEL => self.delete_model(string_arg(args, "name")?).await.map(|_| Value::Null),
            commands::START_MODEL => self.start_model(string_arg(args, "name")?).await.map(|_| Value::Null),
            commands::UNLOAD_MODEL => self.unload_model(string_arg(args, "name")?).await.map(|_| Value::Null),
            commands::UPDATE_OLLAMA_CONFIG => self
                .set_base_url(string_arg(args, "endpoint")?)
                .map(|_| Value::Null),
            commands::CHECK_CONNECTION => Ok(Value::Bool(self.health_check().await)),
            commands::RECORD_TOKENS => self.record_tokens(args).map(|_| Value::Null),
            commands::GET_TOKEN_STATS => serde_json::to_value(self.ledger.aggregated()?)
                .map_err(|e| OllamaError::InvalidResponse(e.to_string())),
            commands::CLEAR_ALL_DATA => self.ledger.clear().map(|_| Value::Null).map_err(Into::into),
            other => Err(OllamaError::InvalidArguments(format!(
                "unsupported command {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl CommandTransport for OllamaBackend {
    async fn call(&self, command: &str, args: Value) -> std::result::Result<Value, TransportError> {
        if !is_known_command(command) {
            return Err(TransportError::UnknownCommand(command.to_string()));
        }
        self.dispatch(command, &args).await.map_err(TransportError::from)
    }
}

impl EventSource for OllamaBackend {
    fn subscribe(&self, topic: &str, handler: EventHandler) -> Subscription {
        self.events.subscribe(topic, handler)
    }
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("base_url", &*self.base_url.read())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn is_known_command(command: &str) -> bool {
    matches!(
        command,
        commands::GET_MODELS
            | commands::GET_RUNNING_MODELS
            | commands::GET_GPU_INFO
            | commands::PULL_MODEL
            | commands::DELETE_MODEL
            | commands::START_MODEL
            | commands::UNLOAD_MODEL
            | commands::UPDATE_OLLAMA_CONFIG
            | commands::CHECK_CONNECTION
            | commands::RECORD_TOKENS
            | commands::GET_TOKEN_STATS
            | commands::CLEAR_ALL_DATA
    )
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(OllamaError::ConfigError(
            "Ollama base URL is required".to_string(),
        ));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|e| OllamaError::ConfigError(format!("Invalid Ollama base URL {}: {}", trimmed, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(OllamaError::ConfigError(format!(
            "Ollama base URL must be http(s) with a host: {}",
            trimmed
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("Ollama request failed: HTTP {}: {}", status, body);
    Err(OllamaError::Http {
        status: status.as_u16(),
        body,
    })
}

fn models_field(mut body: Value) -> Result<Vec<Value>> {
    match body.get_mut("models").map(Value::take) {
        Some(Value::Array(models)) => Ok(models),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(OllamaError::InvalidResponse(format!(
            "expected a models array, got {}",
            other
        ))),
    }
}

fn string_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| OllamaError::InvalidArguments(format!("missing string argument '{}'", key)))
}

fn non_empty_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    let value = string_arg(args, key)?.trim();
    if value.is_empty() {
        return Err(OllamaError::InvalidArguments(format!("argument '{}' must not be empty", key)));
    }
    Ok(value)
}

fn count_arg(args: &Value, key: &str) -> Result<u64> {
    args.get(key).and_then(Value::as_u64).ok_or_else(|| {
        OllamaError::InvalidArguments(format!("missing non-negative integer argument '{}'", key))
    })
}

/// `{status, completed, total}` of one pull status line, counters default to 0
fn progress_payload(line: &Value) -> Value {
    json!({
        "status": line.get("status").and_then(Value::as_str).unwrap_or_default(),
        "completed": line.get("completed").and_then(Value::as_u64).unwrap_or(0),
        "total": line.get("total").and_then(Value::as_u64).unwrap_or(0),
    })
}

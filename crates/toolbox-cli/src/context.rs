// Application state container

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use toolbox_config::AppConfig;
use toolbox_models::{
    CommandGateway, CommandTransport, EventSource, ModelRegistry, ProgressQueue,
    ProgressReconciler,
};
use toolbox_ollama::{NvidiaSmiProbe, OllamaBackend};
use toolbox_preferences::{ColorSchemeProvider, PreferenceStore, TerminalColorScheme};
use toolbox_storage::{JsonFileStore, KeyValueStore, TokenLedger};

use crate::error::CliResult;

/// Owns the gateway, the model registry, the preference store, and the
/// progress reconciler for one process
///
/// Construct once at startup and pass by reference; tests build a fresh one
/// per case with [`AppContext::with_parts`].
pub struct AppContext {
    gateway: CommandGateway,
    registry: Arc<ModelRegistry>,
    preferences: Arc<PreferenceStore>,
    reconciler: ProgressReconciler,
    queue: Mutex<Option<ProgressQueue>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    synced: AtomicBool,
    refreshed: AtomicBool,
}

impl AppContext {
    /// Wire the components over explicit dependencies
    pub fn with_parts(
        transport: Arc<dyn CommandTransport>,
        events: Arc<dyn EventSource>,
        storage: Arc<dyn KeyValueStore>,
        color_scheme: Arc<dyn ColorSchemeProvider>,
        default_endpoint: &str,
    ) -> Self {
        let gateway = CommandGateway::new(transport);
        let registry = Arc::new(ModelRegistry::new(gateway.clone(), storage.clone()));
        let preferences = Arc::new(PreferenceStore::load(
            storage,
            gateway.clone(),
            color_scheme,
            default_endpoint,
        ));
        let (reconciler, queue) = ProgressReconciler::new(events);

        Self {
            gateway,
            registry,
            preferences,
            reconciler,
            queue: Mutex::new(Some(queue)),
            reader: Mutex::new(None),
            synced: AtomicBool::new(false),
            refreshed: AtomicBool::new(false),
        }
    }

    /// Build the production wiring: Ollama over HTTP, JSON file storage,
    /// terminal color scheme
    pub fn from_config(config: &AppConfig) -> CliResult<Self> {
        let data_dir = config.storage.resolve_data_dir();
        let storage = Arc::new(JsonFileStore::open(JsonFileStore::path_in(&data_dir))?);
        debug!("Using storage at {}", storage.path().display());
        let backend = Arc::new(
            OllamaBackend::with_timeout(&config.ollama.endpoint, config.ollama.timeout())?
                .with_gpu_probe(Arc::new(NvidiaSmiProbe::new()))
                .with_token_ledger(TokenLedger::new(storage.clone())),
        );

        Ok(Self::with_parts(
            backend.clone(),
            backend,
            storage,
            Arc::new(TerminalColorScheme::new()),
            &config.ollama.endpoint,
        ))
    }

    /// Local startup: subscribe to progress, start the reader, apply
    /// preferences
    ///
    /// Touches nothing remote. Idempotent.
    pub fn activate(&self) {
        if self.reconciler.subscribe() {
            debug!("Progress subscription established");
        }
        if let Some(queue) = self.queue.lock().take() {
            *self.reader.lock() = Some(self.registry.spawn_progress_reader(queue));
        }
        self.preferences.init();
    }

    /// Full startup: [`activate`](Self::activate), push the persisted
    /// endpoint to the remote manager, then refresh models, running models,
    /// and GPU usage
    ///
    /// The remote steps run once per context.
    pub async fn start(&self) {
        self.activate();
        if !self.synced.swap(true, Ordering::SeqCst) {
            self.preferences.sync_to_backend().await;
        }
        if !self.refreshed.swap(true, Ordering::SeqCst) {
            self.registry.refresh_all().await;
            info!("Application state initialized");
        }
    }

    /// Unsubscribe from progress events and stop the reader; idempotent
    pub fn shutdown(&self) {
        let unsubscribed = self.reconciler.unsubscribe();
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        if unsubscribed {
            info!("Application context shut down");
        }
    }

    pub fn gateway(&self) -> &CommandGateway {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn preferences(&self) -> &Arc<PreferenceStore> {
        &self.preferences
    }

    pub fn is_listening(&self) -> bool {
        self.reconciler.is_subscribed()
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("registry", &self.registry)
            .field("preferences", &self.preferences)
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

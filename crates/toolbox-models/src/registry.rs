//! Model registry state
//!
//! [`ModelRegistry`] is the in-memory mirror of the remote manager: installed
//! models, running models, GPU usage, pull progress, and the selected model.
//! Every field is a `watch` channel holding a value that is replaced
//! wholesale, so interleaved operations can only ever produce "last write
//! wins", never a half-updated collection.
//!
//! Error policy:
//! - refreshes (`fetch_*`) log failures and keep the last known value
//! - mutations (`pull`, `delete`, `start`, `unload`) log and return the error
//! - `select_model` cannot fail

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use toolbox_storage::KeyValueStore;

use crate::{
    error::ModelSyncError,
    events::ProgressQueue,
    gateway::CommandGateway,
    models::{GpuInfo, ModelDescriptor, PullProgress, RunningModelDescriptor},
    Result,
};

/// Durable key holding the last selected model name
pub const SELECTED_MODEL_KEY: &str = "selectedModel";

/// State container for model and resource state
pub struct ModelRegistry {
    gateway: CommandGateway,
    storage: Arc<dyn KeyValueStore>,
    models: watch::Sender<Vec<ModelDescriptor>>,
    running_models: watch::Sender<Vec<RunningModelDescriptor>>,
    loading: watch::Sender<bool>,
    gpu_info: watch::Sender<GpuInfo>,
    pull_progress: watch::Sender<PullProgress>,
    selected_model: watch::Sender<String>,
    progress_queue: OnceLock<Mutex<ProgressQueue>>,
    // only touched inside the matching watch's modify closure
    fetches_in_flight: AtomicUsize,
    pulls_in_flight: AtomicUsize,
}

impl ModelRegistry {
    /// Create a registry, restoring the selected model from `storage`
    pub fn new(gateway: CommandGateway, storage: Arc<dyn KeyValueStore>) -> Self {
        let selected = Self::restore_selected_model(storage.as_ref());
        Self {
            gateway,
            storage,
            models: watch::Sender::new(Vec::new()),
            running_models: watch::Sender::new(Vec::new()),
            loading: watch::Sender::new(false),
            gpu_info: watch::Sender::new(GpuInfo::default()),
            pull_progress: watch::Sender::new(PullProgress::default()),
            selected_model: watch::Sender::new(selected),
            progress_queue: OnceLock::new(),
            fetches_in_flight: AtomicUsize::new(0),
            pulls_in_flight: AtomicUsize::new(0),
        }
    }

    fn restore_selected_model(storage: &dyn KeyValueStore) -> String {
        match storage.get(SELECTED_MODEL_KEY) {
            Ok(Some(name)) => {
                debug!("Restored selected model: {}", name);
                name
            }
            Ok(None) => String::new(),
            Err(e) => {
                warn!("Failed to restore selected model: {}", e);
                String::new()
            }
        }
    }

    pub fn gateway(&self) -> &CommandGateway {
        &self.gateway
    }

    // ── Refreshes ──────────────────────────────────────────────────────────

    /// Refresh the installed-model list
    ///
    /// `loading` stays true while any refresh of the list is in flight.
    pub async fn fetch_models(&self) {
        let _loading = LoadingGuard::enter(self);
        match self.gateway.get_models().await {
            Ok(models) => {
                debug!("Fetched {} installed models", models.len());
                self.models.send_replace(models);
            }
            Err(e) => error!("Failed to fetch models: {}", e),
        }
    }

    /// Refresh GPU usage; the previous value is kept on failure
    pub async fn fetch_gpu_info(&self) {
        match self.gateway.get_gpu_info().await {
            Ok(report) => {
                self.gpu_info.send_replace(GpuInfo::from(report));
            }
            Err(e) => warn!("Failed to fetch GPU info: {}", e),
        }
    }

    /// Refresh the list of models resident in GPU memory
    pub async fn fetch_running_models(&self) {
        match self.gateway.get_running_models().await {
            Ok(running) => {
                debug!("Fetched {} running models", running.len());
                self.running_models.send_replace(running);
            }
            Err(e) => error!("Failed to fetch running models: {}", e),
        }
    }

    /// Refresh installed models, running models, and GPU usage concurrently
    pub async fn refresh_all(&self) {
        tokio::join!(
            self.fetch_models(),
            self.fetch_running_models(),
            self.fetch_gpu_info()
        );
    }

    // ── Mutations ──────────────────────────────────────────────────────────

    /// Pull (download) a model, then refresh the installed list
    ///
    /// Progress is reset to the initializing snapshot when the pull starts and
    /// to the empty snapshot when it settles, whatever the outcome. Snapshots
    /// still queued when the remote call resolves are applied before the
    /// reset.
    pub async fn pull_model(&self, name: &str) -> Result<()> {
        validate_model_name(name)?;
        info!("Pulling model: {}", name);

        // leftovers from an earlier pull must not land in this one
        self.drain_progress().await;
        let outcome = {
            let _pull = PullGuard::begin(self);
            let outcome = self.gateway.pull_model(name).await;
            self.drain_progress().await;
            outcome
        };

        match outcome {
            Ok(()) => {
                info!("Successfully pulled model: {}", name);
                self.fetch_models().await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to pull model {}: {}", name, e);
                Err(e)
            }
        }
    }

    /// Delete an installed model, then refresh the installed list
    pub async fn delete_model(&self, name: &str) -> Result<()> {
        validate_model_name(name)?;
        match self.gateway.delete_model(name).await {
            Ok(()) => {
                info!("Deleted model: {}", name);
                self.fetch_models().await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to delete model {}: {}", name, e);
                Err(e)
            }
        }
    }

    /// Load a model into GPU memory, then refresh the running list
    pub async fn start_model(&self, name: &str) -> Result<()> {
        validate_model_name(name)?;
        match self.gateway.start_model(name).await {
            Ok(()) => {
                info!("Started model: {}", name);
                self.fetch_running_models().await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to start model {}: {}", name, e);
                Err(e)
            }
        }
    }

    /// Unload a model from GPU memory, then refresh the running list
    pub async fn unload_model(&self, name: &str) -> Result<()> {
        validate_model_name(name)?;
        match self.gateway.unload_model(name).await {
            Ok(()) => {
                info!("Unloaded model: {}", name);
                self.fetch_running_models().await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to unload model {}: {}", name, e);
                Err(e)
            }
        }
    }

    /// Select the model used downstream and persist the choice
    ///
    /// Local only. A failed durable write is logged; the in-memory selection
    /// still changes.
    pub fn select_model(&self, name: impl Into<String>) {
        let name = name.into();
        if let Err(e) = self.storage.set(SELECTED_MODEL_KEY, &name) {
            warn!("Failed to persist selected model {}: {}", name, e);
        }
        debug!("Selected model: {}", name);
        self.selected_model.send_replace(name);
    }

    // ── Progress ───────────────────────────────────────────────────────────

    /// Apply one progress snapshot
    ///
    /// Snapshots arriving while no pull is in flight are discarded so a late
    /// event can never resurrect progress after a pull settled.
    pub fn apply_progress(&self, progress: PullProgress) -> bool {
        let applied = self.pull_progress.send_if_modified(|current| {
            if self.pulls_in_flight.load(Ordering::SeqCst) == 0 {
                return false;
            }
            *current = progress;
            true
        });
        if !applied {
            trace!("Discarded progress snapshot outside of a pull");
        }
        applied
    }

    /// Take ownership of `queue` and spawn the reader applying its snapshots
    /// as they arrive
    ///
    /// A registry holds at most one queue; a second one is ignored. The
    /// reader stops once the queue is closed.
    pub fn spawn_progress_reader(self: &Arc<Self>, queue: ProgressQueue) -> JoinHandle<()> {
        let ready = queue.ready_signal();
        if self.progress_queue.set(Mutex::new(queue)).is_err() {
            warn!("Progress queue already attached, ignoring another one");
            return tokio::spawn(async {});
        }
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                ready.notified().await;
                if !registry.drain_progress().await {
                    break;
                }
            }
            debug!("Progress queue closed");
        })
    }

    /// Apply every queued snapshot in arrival order
    ///
    /// One drain runs at a time. It yields after each snapshot so watchers
    /// observe every step. Returns `false` when no open queue is attached.
    async fn drain_progress(&self) -> bool {
        let Some(queue) = self.progress_queue.get() else {
            return false;
        };
        let mut queue = queue.lock().await;
        while let Some(progress) = queue.try_recv() {
            self.apply_progress(progress);
            tokio::task::yield_now().await;
        }
        !queue.is_closed()
    }

    // ── Snapshots ──────────────────────────────────────────────────────────

    pub fn models(&self) -> Vec<ModelDescriptor> {
        self.models.borrow().clone()
    }

    pub fn running_models(&self) -> Vec<RunningModelDescriptor> {
        self.running_models.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    pub fn gpu_info(&self) -> GpuInfo {
        self.gpu_info.borrow().clone()
    }

    pub fn pull_progress(&self) -> PullProgress {
        self.pull_progress.borrow().clone()
    }

    pub fn selected_model(&self) -> String {
        self.selected_model.borrow().clone()
    }

    /// Whether `name` is in the installed set
    pub fn is_installed(&self, name: &str) -> bool {
        self.models.borrow().iter().any(|m| m.name == name)
    }

    /// Whether `name` is resident in GPU memory
    pub fn is_running(&self, name: &str) -> bool {
        self.running_models.borrow().iter().any(|m| m.name == name)
    }

    // ── Observation ────────────────────────────────────────────────────────

    pub fn watch_models(&self) -> watch::Receiver<Vec<ModelDescriptor>> {
        self.models.subscribe()
    }

    pub fn watch_running_models(&self) -> watch::Receiver<Vec<RunningModelDescriptor>> {
        self.running_models.subscribe()
    }

    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn watch_gpu_info(&self) -> watch::Receiver<GpuInfo> {
        self.gpu_info.subscribe()
    }

    pub fn watch_pull_progress(&self) -> watch::Receiver<PullProgress> {
        self.pull_progress.subscribe()
    }

    pub fn watch_selected_model(&self) -> watch::Receiver<String> {
        self.selected_model.subscribe()
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.models.borrow().len())
            .field("running_models", &self.running_models.borrow().len())
            .field("loading", &self.is_loading())
            .field("selected_model", &*self.selected_model.borrow())
            .finish_non_exhaustive()
    }
}

fn validate_model_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ModelSyncError::InvalidModelName(
            "Model name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Raises `loading` for the lifetime of one list refresh
struct LoadingGuard<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> LoadingGuard<'a> {
    fn enter(registry: &'a ModelRegistry) -> Self {
        registry.loading.send_if_modified(|loading| {
            registry.fetches_in_flight.fetch_add(1, Ordering::SeqCst);
            let changed = !*loading;
            *loading = true;
            changed
        });
        Self { registry }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let registry = self.registry;
        registry.loading.send_if_modified(|loading| {
            let remaining = registry.fetches_in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining == 0 && *loading {
                *loading = false;
                true
            } else {
                false
            }
        });
    }
}

/// Marks a pull as in flight; resets progress to empty when dropped
struct PullGuard<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> PullGuard<'a> {
    fn begin(registry: &'a ModelRegistry) -> Self {
        registry.pull_progress.send_modify(|progress| {
            registry.pulls_in_flight.fetch_add(1, Ordering::SeqCst);
            *progress = PullProgress::initializing();
        });
        Self { registry }
    }
}

impl Drop for PullGuard<'_> {
    fn drop(&mut self) {
        let registry = self.registry;
        registry.pull_progress.send_modify(|progress| {
            registry.pulls_in_flight.fetch_sub(1, Ordering::SeqCst);
            *progress = PullProgress::default();
        });
    }
}

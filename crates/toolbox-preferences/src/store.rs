//! Preference store
//!
//! The full record is written under [`PREFERENCES_KEY`] after every mutation.
//! Theme and language never leave the process. The endpoint is a two-phase
//! update: a local commit that always succeeds, then a push to the remote
//! manager whose outcome is published on [`PreferenceStore::watch_endpoint_sync`].
//! A failed push does not roll the local value back.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use toolbox_models::CommandGateway;
use toolbox_storage::{KeyValueStore, KeyValueStoreExt};

use crate::{
    color_scheme::ColorSchemeProvider,
    error::Result,
    types::{Appearance, EndpointSync, Preferences, Theme},
};

/// Durable key holding the serialized [`Preferences`] record
pub const PREFERENCES_KEY: &str = "ai-toolbox-settings";

pub struct PreferenceStore {
    storage: Arc<dyn KeyValueStore>,
    gateway: CommandGateway,
    color_scheme: Arc<dyn ColorSchemeProvider>,
    preferences: watch::Sender<Preferences>,
    appearance: watch::Sender<Appearance>,
    endpoint_sync: watch::Sender<EndpointSync>,
    initialized: AtomicBool,
    // bumped per push so a stale completion cannot overwrite a newer status
    push_generation: AtomicU64,
}

impl PreferenceStore {
    /// Restore the persisted record
    ///
    /// A missing record starts from defaults with `default_endpoint`; an
    /// unreadable one does too, after a warning.
    pub fn load(
        storage: Arc<dyn KeyValueStore>,
        gateway: CommandGateway,
        color_scheme: Arc<dyn ColorSchemeProvider>,
        default_endpoint: &str,
    ) -> Self {
        let preferences = match storage.get_json::<Preferences>(PREFERENCES_KEY) {
            Ok(Some(preferences)) => {
                debug!("Restored preferences: {:?}", preferences);
                preferences
            }
            Ok(None) => Preferences::with_endpoint(default_endpoint),
            Err(e) => {
                warn!("Discarding unreadable preferences, using defaults: {}", e);
                Preferences::with_endpoint(default_endpoint)
            }
        };

        Self {
            storage,
            gateway,
            color_scheme,
            preferences: watch::Sender::new(preferences),
            appearance: watch::Sender::new(Appearance::default()),
            endpoint_sync: watch::Sender::new(EndpointSync::Idle),
            initialized: AtomicBool::new(false),
            push_generation: AtomicU64::new(0),
        }
    }

    /// Apply the persisted theme and language
    ///
    /// Runs once per store; later calls return `false` and do nothing.
    pub fn init(&self) -> bool {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Preferences already initialized");
            return false;
        }

        let preferences = self.preferences();
        self.apply_theme(preferences.theme);
        self.apply_language(&preferences.language);
        info!(
            "Preferences initialized (theme: {}, language: {})",
            preferences.theme, preferences.language
        );
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn set_theme(&self, theme: Theme) {
        self.preferences.send_modify(|p| p.theme = theme);
        self.apply_theme(theme);
        self.persist_or_warn();
    }

    pub fn set_language(&self, language: impl Into<String>) {
        let language = language.into();
        self.preferences.send_modify(|p| p.language = language.clone());
        self.apply_language(&language);
        self.persist_or_warn();
    }

    /// Commit `endpoint` locally, then push it to the remote manager
    ///
    /// Returns once the local commit is done. The push runs on its own task;
    /// its handle resolves to whether the remote manager accepted the value.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context. The check happens
    /// first, so nothing is committed in that case. Synchronous callers can
    /// enter a runtime with [`Runtime::enter`](tokio::runtime::Runtime::enter).
    pub fn set_ollama_endpoint(self: &Arc<Self>, endpoint: impl Into<String>) -> JoinHandle<bool> {
        let runtime = Handle::current();
        let endpoint = endpoint.into();
        self.preferences
            .send_modify(|p| p.ollama_endpoint = endpoint.clone());
        self.persist_or_warn();
        info!("Ollama endpoint set to {}", endpoint);

        let generation = self.begin_push();
        let store = Arc::clone(self);
        runtime.spawn(async move { store.push_endpoint(&endpoint, generation).await })
    }

    /// Re-push the current endpoint, e.g. to a freshly started remote manager
    pub async fn sync_to_backend(&self) -> bool {
        let endpoint = self.ollama_endpoint();
        let generation = self.begin_push();
        self.push_endpoint(&endpoint, generation).await
    }

    /// Write the full record to durable storage
    pub fn persist(&self) -> Result<()> {
        let preferences = self.preferences();
        self.storage.set_json(PREFERENCES_KEY, &preferences)?;
        Ok(())
    }

    fn persist_or_warn(&self) {
        if let Err(e) = self.persist() {
            warn!("Failed to persist preferences: {}", e);
        }
    }

    fn apply_theme(&self, theme: Theme) {
        let dark = match theme {
            Theme::Dark => true,
            Theme::System => self.color_scheme.prefers_dark(),
            Theme::Light => false,
        };
        self.appearance.send_if_modified(|appearance| {
            let changed = appearance.dark != dark;
            appearance.dark = dark;
            changed
        });
        debug!("Applied theme {} (dark: {})", theme, dark);
    }

    fn apply_language(&self, language: &str) {
        self.appearance.send_if_modified(|appearance| {
            if appearance.language == language {
                return false;
            }
            appearance.language = language.to_string();
            true
        });
    }

    fn begin_push(&self) -> u64 {
        let mut generation = 0;
        self.endpoint_sync.send_modify(|status| {
            generation = self.push_generation.fetch_add(1, Ordering::SeqCst) + 1;
            *status = EndpointSync::Pending;
        });
        generation
    }

    async fn push_endpoint(&self, endpoint: &str, generation: u64) -> bool {
        let outcome = self.gateway.update_ollama_config(endpoint).await;
        let status = match &outcome {
            Ok(()) => {
                info!("Remote manager now uses {}", endpoint);
                EndpointSync::Synced
            }
            Err(e) => {
                error!("Failed to update Ollama config in backend: {}", e);
                EndpointSync::Failed(e.to_string())
            }
        };
        self.endpoint_sync.send_if_modified(|current| {
            if self.push_generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = status;
            true
        });
        outcome.is_ok()
    }

    // ── Snapshots ──────────────────────────────────────────────────────────

    pub fn preferences(&self) -> Preferences {
        self.preferences.borrow().clone()
    }

    pub fn theme(&self) -> Theme {
        self.preferences.borrow().theme
    }

    pub fn language(&self) -> String {
        self.preferences.borrow().language.clone()
    }

    pub fn ollama_endpoint(&self) -> String {
        self.preferences.borrow().ollama_endpoint.clone()
    }

    pub fn appearance(&self) -> Appearance {
        self.appearance.borrow().clone()
    }

    pub fn endpoint_sync(&self) -> EndpointSync {
        self.endpoint_sync.borrow().clone()
    }

    // ── Observation ────────────────────────────────────────────────────────

    pub fn watch_preferences(&self) -> watch::Receiver<Preferences> {
        self.preferences.subscribe()
    }

    pub fn watch_appearance(&self) -> watch::Receiver<Appearance> {
        self.appearance.subscribe()
    }

    pub fn watch_endpoint_sync(&self) -> watch::Receiver<EndpointSync> {
        self.endpoint_sync.subscribe()
    }
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("preferences", &*self.preferences.borrow())
            .field("initialized", &self.is_initialized())
            .field("endpoint_sync", &*self.endpoint_sync.borrow())
            .finish_non_exhaustive()
    }
}

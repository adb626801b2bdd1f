//! Shared fixtures for application-level scenarios

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use toolbox_cli::AppContext;
use tokio::task::JoinHandle;
use toolbox_models::{
    CommandTransport, EventHandler, EventHub, EventSource, ModelRegistry, Subscription,
    TransportError,
};
use toolbox_preferences::StaticColorScheme;
use toolbox_storage::KeyValueStore;

pub const ENDPOINT: &str = "http://127.0.0.1:11434";

type Reply = Result<Value, TransportError>;
type Script = Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Reply> + Send>> + Send + Sync>;

/// In-process stand-in for the desktop backend: answers commands and
/// publishes events on its own hub
#[derive(Default)]
pub struct ScriptedBackend {
    pub hub: EventHub,
    replies: Mutex<HashMap<String, Reply>>,
    scripts: Mutex<HashMap<String, Script>>,
    log: Mutex<Vec<(String, Value)>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, command: &str, value: Value) {
        self.replies.lock().insert(command.to_string(), Ok(value));
    }

    pub fn reject(&self, command: &str, reason: &str) {
        self.replies.lock().insert(
            command.to_string(),
            Err(TransportError::Rejected(reason.to_string())),
        );
    }

    pub fn script<F, Fut>(&self, command: &str, script: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        let script: Script = Arc::new(move |args| Box::pin(script(args)));
        self.scripts.lock().insert(command.to_string(), script);
    }

    pub fn count(&self, command: &str) -> usize {
        self.log.lock().iter().filter(|(name, _)| name == command).count()
    }

    pub fn args_of(&self, command: &str) -> Vec<Value> {
        self.log
            .lock()
            .iter()
            .filter(|(name, _)| name == command)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.log.lock().len()
    }
}

#[async_trait]
impl CommandTransport for ScriptedBackend {
    async fn call(&self, command: &str, args: Value) -> Reply {
        self.log.lock().push((command.to_string(), args.clone()));
        let script = self.scripts.lock().get(command).cloned();
        match script {
            Some(script) => script(args).await,
            None => self
                .replies
                .lock()
                .get(command)
                .cloned()
                .unwrap_or(Ok(Value::Null)),
        }
    }
}

impl EventSource for ScriptedBackend {
    fn subscribe(&self, topic: &str, handler: EventHandler) -> Subscription {
        self.hub.subscribe(topic, handler)
    }
}

pub fn context(backend: &Arc<ScriptedBackend>, storage: Arc<dyn KeyValueStore>) -> Arc<AppContext> {
    Arc::new(AppContext::with_parts(
        backend.clone(),
        backend.clone(),
        storage,
        Arc::new(StaticColorScheme::new(false)),
        ENDPOINT,
    ))
}

/// Record `(status, percentage)` for every non-empty progress snapshot the
/// registry publishes
pub fn record_progress(registry: &ModelRegistry) -> (Arc<Mutex<Vec<(String, u64)>>>, JoinHandle<()>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut progress = registry.watch_pull_progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            if !snapshot.is_empty() {
                sink.lock().push((snapshot.status, snapshot.percentage));
            }
        }
    });
    (seen, watcher)
}

/// Percentages of the "downloading" snapshots in `seen`
pub fn downloading(seen: &[(String, u64)]) -> Vec<u64> {
    seen.iter()
        .filter(|(status, _)| status == "downloading")
        .map(|(_, percentage)| *percentage)
        .collect()
}

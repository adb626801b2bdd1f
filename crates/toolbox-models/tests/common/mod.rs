//! Shared fixtures: a scriptable in-process remote manager

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use toolbox_models::{
    CommandGateway, CommandTransport, EventHub, ModelRegistry, ProgressReconciler, TransportError,
};
use toolbox_storage::{KeyValueStore, MemoryStore};

type CallResult = Result<Value, TransportError>;
type Handler = Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = CallResult> + Send>> + Send + Sync>;

/// Remote manager double recording every call
///
/// Commands answer with a canned response, a scripted async handler, or
/// `Value::Null` when nothing was configured.
#[derive(Default)]
pub struct FakeManager {
    pub hub: EventHub,
    responses: Mutex<HashMap<String, CallResult>>,
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, command: &str, value: Value) {
        self.responses.lock().insert(command.to_string(), Ok(value));
    }

    pub fn fail(&self, command: &str, message: &str) {
        self.responses
            .lock()
            .insert(command.to_string(), Err(TransportError::Rejected(message.to_string())));
    }

    pub fn on_call<F, Fut>(&self, command: &str, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| Box::pin(handler(args)));
        self.handlers.lock().insert(command.to_string(), handler);
    }

    pub fn calls_to(&self, command: &str) -> usize {
        self.calls.lock().iter().filter(|(name, _)| name == command).count()
    }

    pub fn last_args(&self, command: &str) -> Option<Value> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|(name, _)| name == command)
            .map(|(_, args)| args.clone())
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CommandTransport for FakeManager {
    async fn call(&self, command: &str, args: Value) -> CallResult {
        self.calls.lock().push((command.to_string(), args.clone()));

        let handler = self.handlers.lock().get(command).cloned();
        if let Some(handler) = handler {
            return handler(args).await;
        }

        self.responses
            .lock()
            .get(command)
            .cloned()
            .unwrap_or(Ok(Value::Null))
    }
}

/// A registry wired to `fake`, with its progress reader running
pub struct Harness {
    pub registry: Arc<ModelRegistry>,
    pub reconciler: ProgressReconciler,
    pub reader: JoinHandle<()>,
    pub storage: Arc<dyn KeyValueStore>,
}

pub fn harness(fake: &Arc<FakeManager>) -> Harness {
    harness_with_storage(fake, Arc::new(MemoryStore::new()))
}

pub fn harness_with_storage(fake: &Arc<FakeManager>, storage: Arc<dyn KeyValueStore>) -> Harness {
    let gateway = CommandGateway::new(fake.clone());
    let registry = Arc::new(ModelRegistry::new(gateway, storage.clone()));
    let (reconciler, queue) = ProgressReconciler::new(Arc::new(fake.hub.clone()));
    reconciler.subscribe();
    let reader = registry.spawn_progress_reader(queue);
    Harness {
        registry,
        reconciler,
        reader,
        storage,
    }
}

/// Record the percentage of every "downloading" snapshot the registry
/// publishes, as a watcher would see them
pub fn record_downloads(registry: &ModelRegistry) -> (Arc<Mutex<Vec<u64>>>, JoinHandle<()>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut progress = registry.watch_pull_progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            if snapshot.status == "downloading" {
                sink.lock().push(snapshot.percentage);
            }
        }
    });
    (seen, watcher)
}

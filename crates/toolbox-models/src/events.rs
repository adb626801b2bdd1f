//! Push-event subscription and pull-progress reconciliation
//!
//! The remote manager pushes `pull-progress` events independently of any
//! request. [`ProgressReconciler`] subscribes to that topic once, turns each
//! raw payload into a [`PullProgress`] snapshot, and forwards the snapshots,
//! in arrival order, into a single [`ProgressQueue`]. The queue is owned by
//! the registry holding the progress state, which drains it both from its
//! reader task and at the end of each pull.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use toolbox_models::{EventHub, ProgressReconciler, PULL_PROGRESS_TOPIC};
//!
//! # tokio_test::block_on(async {
//! let hub = EventHub::new();
//! let (reconciler, mut queue) = ProgressReconciler::new(Arc::new(hub.clone()));
//! reconciler.subscribe();
//!
//! hub.emit(PULL_PROGRESS_TOPIC, json!({ "status": "downloading", "completed": 50, "total": 100 }));
//!
//! let snapshot = queue.recv().await.unwrap();
//! assert_eq!(snapshot.percentage, 50);
//! # });
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::models::{ProgressEvent, PullProgress};

/// Topic carrying download progress of in-flight pulls
pub const PULL_PROGRESS_TOPIC: &str = "pull-progress";

/// Callback invoked with each raw event payload
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Push-style event channel from the remote manager
pub trait EventSource: Send + Sync {
    /// Register `handler` for `topic`; dropping the returned guard unsubscribes
    fn subscribe(&self, topic: &str, handler: EventHandler) -> Subscription;
}

/// Guard for a registered event handler
///
/// The handler is removed when the guard is dropped or
/// [`unsubscribe`](Subscription::unsubscribe) is called.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release
    pub fn detached() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// In-process [`EventSource`] that fans payloads out to registered handlers
///
/// Clones share the same handler table. Handlers of one topic are invoked in
/// registration order; payloads emitted from one task arrive in emit order.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(u64, EventHandler)>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `payload` to every handler of `topic`, returning how many ran
    pub fn emit(&self, topic: &str, payload: Value) -> usize {
        // snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<EventHandler> = self
            .inner
            .handlers
            .lock()
            .get(topic)
            .map(|list| list.iter().map(|(_, handler)| Arc::clone(handler)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    /// Number of handlers registered for `topic`
    pub fn handler_count(&self, topic: &str) -> usize {
        self.inner
            .handlers
            .lock()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl EventSource for EventHub {
    fn subscribe(&self, topic: &str, handler: EventHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push((id, handler));

        let inner: Weak<HubInner> = Arc::downgrade(&self.inner);
        let topic = topic.to_string();
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                let mut handlers = inner.handlers.lock();
                if let Some(list) = handlers.get_mut(&topic) {
                    list.retain(|(handler_id, _)| *handler_id != id);
                    if list.is_empty() {
                        handlers.remove(&topic);
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics: Vec<String> = self.inner.handlers.lock().keys().cloned().collect();
        f.debug_struct("EventHub").field("topics", &topics).finish()
    }
}

/// Sending half shared by the reconciler and its handler
///
/// Every send, and the final close, wakes the queue's reader.
struct ProgressSender {
    sender: Option<mpsc::UnboundedSender<PullProgress>>,
    ready: Arc<Notify>,
}

impl ProgressSender {
    fn send(&self, progress: PullProgress) {
        let delivered = self
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(progress).is_ok());
        if delivered {
            self.ready.notify_one();
        } else {
            debug!("Progress queue closed, dropping event");
        }
    }
}

impl Drop for ProgressSender {
    fn drop(&mut self) {
        // close the channel before waking so the reader observes the close
        drop(self.sender.take());
        self.ready.notify_one();
    }
}

/// Receiving end of the progress channel
#[derive(Debug)]
pub struct ProgressQueue {
    receiver: mpsc::UnboundedReceiver<PullProgress>,
    ready: Arc<Notify>,
    closed: bool,
}

impl ProgressQueue {
    /// Next snapshot; `None` once the reconciler and its subscription are gone
    pub async fn recv(&mut self) -> Option<PullProgress> {
        let next = self.receiver.recv().await;
        self.closed = next.is_none();
        next
    }

    /// Next snapshot if one is already queued
    pub fn try_recv(&mut self) -> Option<PullProgress> {
        match self.receiver.try_recv() {
            Ok(progress) => Some(progress),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// Whether a receive has observed that no sender is left
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Signal raised after each queued snapshot and on close
    pub(crate) fn ready_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.ready)
    }
}

/// Folds `pull-progress` events into [`PullProgress`] snapshots
pub struct ProgressReconciler {
    source: Arc<dyn EventSource>,
    sender: Arc<ProgressSender>,
    subscription: Mutex<Option<Subscription>>,
}

impl ProgressReconciler {
    /// Create a reconciler and the queue its snapshots are delivered to
    pub fn new(source: Arc<dyn EventSource>) -> (Self, ProgressQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let ready = Arc::new(Notify::new());
        let reconciler = Self {
            source,
            sender: Arc::new(ProgressSender {
                sender: Some(sender),
                ready: Arc::clone(&ready),
            }),
            subscription: Mutex::new(None),
        };
        let queue = ProgressQueue {
            receiver,
            ready,
            closed: false,
        };
        (reconciler, queue)
    }

    /// Subscribe to the progress topic
    ///
    /// Idempotent: returns `false` without registering a second handler when
    /// already subscribed.
    pub fn subscribe(&self) -> bool {
        let mut slot = self.subscription.lock();
        if slot.is_some() {
            debug!("Already subscribed to {}", PULL_PROGRESS_TOPIC);
            return false;
        }

        let sender = Arc::clone(&self.sender);
        let handler: EventHandler = Arc::new(move |payload| match Self::reconcile(payload) {
            Ok(progress) => sender.send(progress),
            Err(e) => warn!("Ignoring malformed {} payload: {}", PULL_PROGRESS_TOPIC, e),
        });

        *slot = Some(self.source.subscribe(PULL_PROGRESS_TOPIC, handler));
        info!("Subscribed to {}", PULL_PROGRESS_TOPIC);
        true
    }

    /// Drop the subscription; returns whether one was active
    pub fn unsubscribe(&self) -> bool {
        let taken = self.subscription.lock().take();
        match taken {
            Some(subscription) => {
                subscription.unsubscribe();
                info!("Unsubscribed from {}", PULL_PROGRESS_TOPIC);
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Convert one raw payload into a full snapshot
    pub fn reconcile(payload: Value) -> Result<PullProgress, serde_json::Error> {
        serde_json::from_value::<ProgressEvent>(payload).map(PullProgress::from)
    }
}

impl std::fmt::Debug for ProgressReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReconciler")
            .field("subscribed", &self.is_subscribed())
            .finish()
    }
}

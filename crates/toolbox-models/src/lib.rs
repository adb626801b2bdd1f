//! Model & resource state synchronization for AI Toolbox
//!
//! This crate mirrors the state of a remote model manager (an Ollama server
//! fronted by a command transport): installed models, models resident in
//! GPU memory, GPU utilization, and the progress of in-flight pulls.
//!
//! - [`gateway`]: one typed call per remote capability over a [`CommandTransport`]
//! - [`events`]: `pull-progress` subscription folded into [`PullProgress`] snapshots
//! - [`registry`]: the [`ModelRegistry`] state container

pub mod error;
pub mod events;
pub mod gateway;
pub mod models;
pub mod registry;

pub use error::{ModelSyncError, TransportError};
pub use events::{
    EventHandler, EventHub, EventSource, ProgressQueue, ProgressReconciler, Subscription,
    PULL_PROGRESS_TOPIC,
};
pub use gateway::{commands, CommandGateway, CommandTransport};
pub use models::{GpuInfo, GpuReport, ModelDescriptor, ProgressEvent, PullProgress, RunningModelDescriptor};
pub use registry::{ModelRegistry, SELECTED_MODEL_KEY};
pub use toolbox_storage::TokenStat;

/// Result type for model synchronization operations
pub type Result<T> = std::result::Result<T, ModelSyncError>;

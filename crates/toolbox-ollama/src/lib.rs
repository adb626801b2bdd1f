//! Ollama backend for AI Toolbox
//!
//! [`OllamaBackend`] is the concrete remote model manager: it implements
//! [`CommandTransport`](toolbox_models::CommandTransport) by translating each
//! command into Ollama HTTP API calls, and
//! [`EventSource`](toolbox_models::EventSource) by re-emitting the lines of a
//! streaming pull as `pull-progress` events.

pub mod backend;
pub mod error;
pub mod gpu;

pub use backend::{OllamaBackend, DEFAULT_BASE_URL};
pub use error::{OllamaError, Result};
pub use gpu::{parse_nvidia_smi, GpuProbe, NoGpuProbe, NvidiaSmiProbe};

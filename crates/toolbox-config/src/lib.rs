//! Configuration for AI Toolbox
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `<config_dir>/ai-toolbox/config.toml` (optional)
//! 3. `TOOLBOX_*` environment variables, `__` separating sections
//!    (e.g. `TOOLBOX_OLLAMA__ENDPOINT`)

pub mod error;
pub mod loader;
pub mod types;

pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use types::{AppConfig, LoggingConfig, OllamaConfig, StorageConfig, LOG_LEVELS};

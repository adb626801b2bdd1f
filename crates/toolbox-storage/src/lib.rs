//! Durable storage for AI Toolbox
//!
//! A small local-storage style key/value layer: every value lives under a
//! stable string key and survives process restarts. Preferences, the
//! selected model, and the [`TokenLedger`] are all persisted through
//! [`KeyValueStore`].

pub mod error;
pub mod json_store;
pub mod kv;
pub mod stats;

pub use error::{StorageError, StorageResult};
pub use json_store::{load_json, save_json_atomic};
pub use kv::{JsonFileStore, KeyValueStore, KeyValueStoreExt, MemoryStore};
pub use stats::{TokenLedger, TokenStat, TokenUsage, TOKEN_STATS_KEY};

//! User preferences for AI Toolbox
//!
//! [`PreferenceStore`] owns the persisted preference record. Theme and
//! language are applied locally as an observable [`Appearance`]; the Ollama
//! endpoint is committed locally first and then pushed to the remote manager,
//! with the outcome reported through [`EndpointSync`].

pub mod color_scheme;
pub mod error;
pub mod store;
pub mod types;

pub use color_scheme::{ColorSchemeProvider, StaticColorScheme, TerminalColorScheme};
pub use error::{PreferenceError, Result};
pub use store::{PreferenceStore, PREFERENCES_KEY};
pub use types::{Appearance, EndpointSync, Preferences, Theme, DEFAULT_ENDPOINT, DEFAULT_LANGUAGE};

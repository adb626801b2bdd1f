//! Preference record and derived presentation state

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PreferenceError;

/// Endpoint of a locally running Ollama server
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434";

/// Locale used until the user picks one
pub const DEFAULT_LANGUAGE: &str = "zh";

/// Color theme choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    /// Follow the host's color scheme, re-evaluated on every application
    #[default]
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }

    pub fn all() -> [Theme; 3] {
        [Theme::Light, Theme::Dark, Theme::System]
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = PreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "system" => Ok(Theme::System),
            _ => Err(PreferenceError::InvalidTheme(s.to_string())),
        }
    }
}

/// The persisted preference record
///
/// Stored as one JSON document; fields missing from an older record take
/// their default values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub theme: Theme,
    /// Locale code (e.g., "en", "zh")
    pub language: String,
    /// URI of the Ollama server the remote manager talks to
    pub ollama_endpoint: String,
}

impl Preferences {
    /// Defaults with a specific endpoint
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            ollama_endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            ollama_endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Presentation state derived from the applied theme and language
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Appearance {
    /// Whether the dark palette is in effect
    pub dark: bool,
    /// Document language; empty until a language has been applied
    pub language: String,
}

/// Reconciliation status of the endpoint with the remote manager
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EndpointSync {
    /// Nothing pushed yet
    #[default]
    Idle,
    /// A push is in flight
    Pending,
    /// The remote manager accepted the current endpoint
    Synced,
    /// The last push failed; the local value is kept
    Failed(String),
}

impl EndpointSync {
    pub fn is_settled(&self) -> bool {
        matches!(self, EndpointSync::Synced | EndpointSync::Failed(_))
    }
}

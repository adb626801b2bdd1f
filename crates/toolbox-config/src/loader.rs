//! Configuration loading and saving

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use crate::{
    error::{ConfigError, Result},
    types::AppConfig,
};

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "TOOLBOX";

/// Loads [`AppConfig`] from defaults, a TOML file, and the environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Use a specific config file instead of the platform location
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// `<config_dir>/ai-toolbox/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ai-toolbox")
            .join("config.toml")
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load and validate the layered configuration
    pub fn load(&self) -> Result<AppConfig> {
        debug!("Loading configuration from {}", self.config_path.display());

        let config = Config::builder()
            .add_source(
                File::from(self.config_path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Write `config` as TOML to the config file, creating its directory
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        config.validate()?;
        let toml = toml::to_string_pretty(config)?;

        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.config_path, toml).map_err(|source| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        })?;

        info!("Saved configuration to {}", self.config_path.display());
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

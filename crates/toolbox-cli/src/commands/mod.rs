// Command handlers for the toolbox CLI

pub mod config;
pub mod models;
pub mod stats;

pub use config::{ConfigAction, ConfigCommand};
pub use models::{ModelAction, ModelCommand};
pub use stats::{StatsAction, StatsCommand};

use std::sync::Arc;

use crate::context::AppContext;
use crate::error::CliResult;

/// Trait for command handlers
#[async_trait::async_trait]
pub trait Command: Send + Sync {
    /// Execute the command against the shared application state
    async fn execute(&self, ctx: &Arc<AppContext>) -> CliResult<()>;
}

// Command routing and dispatch

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use crate::commands::{
    Command, ConfigAction, ConfigCommand, ModelAction, ModelCommand, StatsAction, StatsCommand,
};
use crate::context::AppContext;
use crate::error::CliResult;

/// AI Toolbox - manage local Ollama models from the terminal
#[derive(Parser, Debug)]
#[command(name = "toolbox")]
#[command(bin_name = "toolbox")]
#[command(about = "Manage local Ollama models, GPU memory, and preferences")]
#[command(version)]
#[command(author = "AI Toolbox Contributors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List installed models
    #[command(alias = "ls")]
    Models,

    /// List models loaded in GPU memory
    #[command(alias = "ps")]
    Running,

    /// Show GPU memory usage
    Gpu,

    /// Download a model
    Pull {
        #[arg(value_name = "MODEL")]
        name: String,
    },

    /// Delete an installed model
    #[command(alias = "delete")]
    Rm {
        #[arg(value_name = "MODEL")]
        name: String,
    },

    /// Load a model into GPU memory and keep it resident
    Start {
        #[arg(value_name = "MODEL")]
        name: String,
    },

    /// Unload a model from GPU memory
    Unload {
        #[arg(value_name = "MODEL")]
        name: String,
    },

    /// Select the model used by downstream tools
    Select {
        #[arg(value_name = "MODEL")]
        name: String,
    },

    /// Print the selected model
    Selected,

    /// Check the connection to the Ollama server
    Status,

    /// View and change preferences
    Config {
        #[command(subcommand)]
        action: Option<ConfigSubcommand>,
    },

    /// Show or record token usage per day
    Stats {
        #[command(subcommand)]
        action: Option<StatsSubcommand>,
    },

    /// Erase all application data (token usage statistics)
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum StatsSubcommand {
    /// Show token totals per day
    Show,

    /// Record token usage of a model
    Record {
        #[arg(value_name = "MODEL")]
        model: String,

        /// Prompt tokens consumed
        #[arg(long)]
        prompt: u64,

        /// Completion tokens produced
        #[arg(long)]
        completion: u64,

        /// Day of the usage (defaults to today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigSubcommand {
    /// Show configuration and preferences
    Show,

    /// Set the color theme (light, dark, system)
    Theme {
        #[arg(value_name = "THEME")]
        theme: String,
    },

    /// Set the interface language (e.g. en, zh)
    Language {
        #[arg(value_name = "LANG")]
        language: String,
    },

    /// Set the Ollama endpoint and push it to the backend
    Endpoint {
        #[arg(value_name = "URI")]
        uri: String,
    },
}

/// Command router
pub struct CommandRouter;

impl CommandRouter {
    /// Execute `command` against `ctx`
    pub async fn execute(command: Commands, ctx: &Arc<AppContext>) -> CliResult<()> {
        match command {
            Commands::Models => ModelCommand::new(ModelAction::List).execute(ctx).await,
            Commands::Running => ModelCommand::new(ModelAction::Running).execute(ctx).await,
            Commands::Gpu => ModelCommand::new(ModelAction::Gpu).execute(ctx).await,
            Commands::Pull { name } => ModelCommand::new(ModelAction::Pull(name)).execute(ctx).await,
            Commands::Rm { name } => ModelCommand::new(ModelAction::Delete(name)).execute(ctx).await,
            Commands::Start { name } => ModelCommand::new(ModelAction::Start(name)).execute(ctx).await,
            Commands::Unload { name } => {
                ModelCommand::new(ModelAction::Unload(name)).execute(ctx).await
            }
            Commands::Select { name } => {
                ModelCommand::new(ModelAction::Select(name)).execute(ctx).await
            }
            Commands::Selected => ModelCommand::new(ModelAction::Selected).execute(ctx).await,
            Commands::Status => ModelCommand::new(ModelAction::Status).execute(ctx).await,
            Commands::Config { action } => {
                let action = match action.unwrap_or(ConfigSubcommand::Show) {
                    ConfigSubcommand::Show => ConfigAction::Show,
                    ConfigSubcommand::Theme { theme } => ConfigAction::Theme(theme),
                    ConfigSubcommand::Language { language } => ConfigAction::Language(language),
                    ConfigSubcommand::Endpoint { uri } => ConfigAction::Endpoint(uri),
                };
                ConfigCommand::new(action).execute(ctx).await
            }
            Commands::Stats { action } => {
                let action = match action.unwrap_or(StatsSubcommand::Show) {
                    StatsSubcommand::Show => StatsAction::Show,
                    StatsSubcommand::Record {
                        model,
                        prompt,
                        completion,
                        date,
                    } => StatsAction::Record {
                        model,
                        prompt,
                        completion,
                        date: date.unwrap_or_else(|| Local::now().date_naive()),
                    },
                };
                StatsCommand::new(action).execute(ctx).await
            }
            Commands::Clear { yes } => {
                StatsCommand::new(StatsAction::Clear { confirmed: yes })
                    .execute(ctx)
                    .await
            }
        }
    }
}

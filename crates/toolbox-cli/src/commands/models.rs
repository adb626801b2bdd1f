// Model management commands

use std::sync::Arc;

use indicatif::ProgressBar;
use tracing::debug;

use super::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::logging::VerbosityLevel;
use crate::output::{print_success, print_warning, render_gpu, render_models, render_running, OutputStyle};
use crate::progress::{create_pull_bar, create_spinner, follow_pull};

/// Operate on installed and running models
pub struct ModelCommand {
    pub action: ModelAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelAction {
    List,
    Running,
    Gpu,
    Pull(String),
    Delete(String),
    Start(String),
    Unload(String),
    Select(String),
    Selected,
    Status,
}

impl ModelCommand {
    pub fn new(action: ModelAction) -> Self {
        Self { action }
    }

    fn list(&self, ctx: &AppContext) -> CliResult<()> {
        let registry = ctx.registry();
        let style = OutputStyle::default();
        println!(
            "{}",
            render_models(&style, &registry.models(), &registry.selected_model())
        );
        Ok(())
    }

    fn running(&self, ctx: &AppContext) -> CliResult<()> {
        let style = OutputStyle::default();
        println!("{}", render_running(&style, &ctx.registry().running_models()));
        Ok(())
    }

    fn gpu(&self, ctx: &AppContext) -> CliResult<()> {
        let style = OutputStyle::default();
        println!("{}", render_gpu(&style, &ctx.registry().gpu_info()));
        Ok(())
    }

    async fn pull(&self, ctx: &AppContext, name: &str) -> CliResult<()> {
        let bar = if VerbosityLevel::Normal.should_output() {
            create_pull_bar(name)
        } else {
            ProgressBar::hidden()
        };
        let follower = tokio::spawn(follow_pull(
            ctx.registry().watch_pull_progress(),
            bar.clone(),
        ));

        let result = ctx.registry().pull_model(name).await;
        follower.abort();

        match result {
            Ok(()) => {
                bar.finish_and_clear();
                print_success(&format!("Pulled {}", name));
                Ok(())
            }
            Err(e) => {
                bar.abandon_with_message("failed");
                Err(e.into())
            }
        }
    }

    async fn delete(&self, ctx: &AppContext, name: &str) -> CliResult<()> {
        ctx.registry().delete_model(name).await?;
        if ctx.registry().selected_model() == name {
            print_warning(&format!(
                "{} was the selected model; select another with 'toolbox select <name>'",
                name
            ));
        }
        print_success(&format!("Deleted {}", name));
        Ok(())
    }

    async fn start(&self, ctx: &AppContext, name: &str) -> CliResult<()> {
        let spinner = spinner_for(&format!("Loading {} into GPU memory...", name));
        let result = ctx.registry().start_model(name).await;
        spinner.finish_and_clear();
        result?;
        print_success(&format!("Started {}", name));
        Ok(())
    }

    async fn unload(&self, ctx: &AppContext, name: &str) -> CliResult<()> {
        ctx.registry().unload_model(name).await?;
        print_success(&format!("Unloaded {}", name));
        Ok(())
    }

    fn select(&self, ctx: &AppContext, name: &str) -> CliResult<()> {
        if name.trim().is_empty() {
            return Err(CliError::InvalidArgument {
                message: "model name must not be empty".to_string(),
            });
        }
        ctx.registry().select_model(name);
        print_success(&format!("Selected {}", name));
        Ok(())
    }

    fn selected(&self, ctx: &AppContext) -> CliResult<()> {
        let selected = ctx.registry().selected_model();
        if selected.is_empty() {
            let style = OutputStyle::default();
            println!("{}", style.info("No model selected."));
        } else {
            println!("{}", selected);
        }
        Ok(())
    }

    async fn status(&self, ctx: &AppContext) -> CliResult<()> {
        let style = OutputStyle::default();
        let endpoint = ctx.preferences().ollama_endpoint();
        let connected = ctx.gateway().check_connection().await?;
        if connected {
            println!("{}", style.success(&format!("Ollama is reachable at {}", endpoint)));
        } else {
            println!("{}", style.error(&format!("Ollama is not reachable at {}", endpoint)));
        }
        Ok(())
    }

    /// Actions that only read or write local state skip the remote startup
    fn is_local(&self) -> bool {
        matches!(
            self.action,
            ModelAction::Select(_) | ModelAction::Selected
        )
    }
}

fn spinner_for(message: &str) -> ProgressBar {
    if VerbosityLevel::Normal.should_output() {
        create_spinner(message)
    } else {
        ProgressBar::hidden()
    }
}

#[async_trait::async_trait]
impl Command for ModelCommand {
    async fn execute(&self, ctx: &Arc<AppContext>) -> CliResult<()> {
        debug!("Executing model command: {:?}", self.action);
        if self.is_local() {
            ctx.activate();
        } else {
            ctx.start().await;
        }

        match &self.action {
            ModelAction::List => self.list(ctx),
            ModelAction::Running => self.running(ctx),
            ModelAction::Gpu => self.gpu(ctx),
            ModelAction::Pull(name) => self.pull(ctx, name).await,
            ModelAction::Delete(name) => self.delete(ctx, name).await,
            ModelAction::Start(name) => self.start(ctx, name).await,
            ModelAction::Unload(name) => self.unload(ctx, name).await,
            ModelAction::Select(name) => self.select(ctx, name),
            ModelAction::Selected => self.selected(ctx),
            ModelAction::Status => self.status(ctx).await,
        }
    }
}

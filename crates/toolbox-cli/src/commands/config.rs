// Preference management

use std::sync::Arc;

use tracing::debug;

use toolbox_preferences::{EndpointSync, Theme};

use super::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::{print_success, print_warning, OutputStyle};

/// View and change user preferences
pub struct ConfigCommand {
    pub action: ConfigAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Show,
    Theme(String),
    Language(String),
    Endpoint(String),
}

impl ConfigCommand {
    pub fn new(action: ConfigAction) -> Self {
        Self { action }
    }

    fn show(&self, ctx: &AppContext) -> CliResult<()> {
        let style = OutputStyle::default();
        let preferences = ctx.preferences().preferences();
        let appearance = ctx.preferences().appearance();

        println!("{}", style.header("AI Toolbox Preferences"));
        println!();
        println!(
            "  {} = {} ({})",
            style.code("theme"),
            preferences.theme,
            if appearance.dark { "dark" } else { "light" }
        );
        println!("  {} = {}", style.code("language"), preferences.language);
        println!(
            "  {} = {}",
            style.code("ollama_endpoint"),
            preferences.ollama_endpoint
        );
        let selected = ctx.registry().selected_model();
        if !selected.is_empty() {
            println!("  {} = {}", style.code("selected_model"), selected);
        }
        Ok(())
    }

    fn theme(&self, ctx: &AppContext, value: &str) -> CliResult<()> {
        let theme: Theme = value.parse()?;
        ctx.preferences().set_theme(theme);
        print_success(&format!("Theme set to {}", theme));
        Ok(())
    }

    fn language(&self, ctx: &AppContext, value: &str) -> CliResult<()> {
        let language = value.trim();
        if language.is_empty() {
            return Err(CliError::InvalidArgument {
                message: "language must not be empty".to_string(),
            });
        }
        ctx.preferences().set_language(language);
        print_success(&format!("Language set to {}", language));
        Ok(())
    }

    async fn endpoint(&self, ctx: &AppContext, value: &str) -> CliResult<()> {
        let endpoint = value.trim();
        if endpoint.is_empty() {
            return Err(CliError::InvalidArgument {
                message: "endpoint must not be empty".to_string(),
            });
        }

        let push = ctx.preferences().set_ollama_endpoint(endpoint);
        if push.await? {
            print_success(&format!("Ollama endpoint set to {}", endpoint));
        } else {
            let reason = match ctx.preferences().endpoint_sync() {
                EndpointSync::Failed(reason) => reason,
                other => format!("{:?}", other),
            };
            print_warning(&format!(
                "Saved {} locally, but the backend rejected it: {}",
                endpoint, reason
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Command for ConfigCommand {
    async fn execute(&self, ctx: &Arc<AppContext>) -> CliResult<()> {
        debug!("Executing config command: {:?}", self.action);
        ctx.activate();

        match &self.action {
            ConfigAction::Show => self.show(ctx),
            ConfigAction::Theme(value) => self.theme(ctx, value),
            ConfigAction::Language(value) => self.language(ctx, value),
            ConfigAction::Endpoint(value) => self.endpoint(ctx, value).await,
        }
    }
}

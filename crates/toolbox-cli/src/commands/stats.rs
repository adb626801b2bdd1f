// Token usage statistics and data reset

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use super::Command;
use crate::context::AppContext;
use crate::error::{CliError, CliResult};
use crate::output::{print_success, render_token_stats, OutputStyle};

/// Date format of recorded usage
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Show, record, and clear token usage
pub struct StatsCommand {
    pub action: StatsAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsAction {
    Show,
    Record {
        model: String,
        prompt: u64,
        completion: u64,
        date: NaiveDate,
    },
    /// Erase all application data; `confirmed` must be set
    Clear { confirmed: bool },
}

impl StatsCommand {
    pub fn new(action: StatsAction) -> Self {
        Self { action }
    }

    async fn show(&self, ctx: &AppContext) -> CliResult<()> {
        let stats = ctx.gateway().get_token_stats().await?;
        let style = OutputStyle::default();
        println!("{}", render_token_stats(&style, &stats));
        Ok(())
    }

    async fn record(
        &self,
        ctx: &AppContext,
        model: &str,
        prompt: u64,
        completion: u64,
        date: NaiveDate,
    ) -> CliResult<()> {
        let model = model.trim();
        if model.is_empty() {
            return Err(CliError::InvalidArgument {
                message: "model name must not be empty".to_string(),
            });
        }
        let date = date.format(DATE_FORMAT).to_string();
        ctx.gateway()
            .record_tokens(&date, prompt, completion, model)
            .await?;
        print_success(&format!(
            "Recorded {} tokens for {} on {}",
            prompt.saturating_add(completion),
            model,
            date
        ));
        Ok(())
    }

    async fn clear(&self, ctx: &AppContext, confirmed: bool) -> CliResult<()> {
        if !confirmed {
            return Err(CliError::InvalidArgument {
                message: "clearing deletes all recorded usage; pass --yes to confirm".to_string(),
            });
        }
        ctx.gateway().clear_all_data().await?;
        print_success("Cleared all application data");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Command for StatsCommand {
    async fn execute(&self, ctx: &Arc<AppContext>) -> CliResult<()> {
        debug!("Executing stats command: {:?}", self.action);
        // the usage ledger needs neither a model refresh nor an endpoint push
        ctx.activate();

        match &self.action {
            StatsAction::Show => self.show(ctx).await,
            StatsAction::Record {
                model,
                prompt,
                completion,
                date,
            } => self.record(ctx, model, *prompt, *completion, *date).await,
            StatsAction::Clear { confirmed } => self.clear(ctx, *confirmed).await,
        }
    }
}

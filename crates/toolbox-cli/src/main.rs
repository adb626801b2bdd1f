// AI Toolbox CLI Entry Point

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::debug;

use toolbox_cli::{init_logging, output, AppContext, Cli, CommandRouter, VerbosityLevel};
use toolbox_config::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loader = ConfigLoader::new();
    let config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            output::print_error(&format!(
                "Failed to load {}: {}",
                loader.config_path().display(),
                e
            ));
            std::process::exit(1);
        }
    };

    let level = init_logging(cli.verbose, cli.quiet, &config.logging.level);
    debug!("Logging at {} with config {:?}", level, config);

    let ctx = match AppContext::from_config(&config).context("Failed to initialize application state") {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };

    let result = CommandRouter::execute(cli.command, &ctx).await;
    ctx.shutdown();

    if let Err(e) = result {
        output::print_error(&e.user_message());
        if VerbosityLevel::Verbose.should_output() {
            eprintln!("{}", e.technical_details());
        }
        std::process::exit(1);
    }
}

//! Graph Retriever CLI
//!
//! Runs retrieval queries and cache maintenance commands against the
//! configured graph store and query cache.

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::{CommandFactory, Parser};
use dotenvy::dotenv;
use graph_retriever::app::App;
use graph_retriever::config::{AppConfig, Cli};
use graph_retriever::telemetry;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env (if present) before clap reads env aliases
    let _ = dotenv();

    let cli = Cli::parse();
    let config = match AppConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    telemetry::init(&config.logging);

    info!(
        name: "config.loaded",
        provider = %config.graph_store.provider,
        graph_url = %config.graph_store.url,
        cache_enabled = config.cache.enabled,
        max_depth = config.retrieval.max_depth,
        "Configuration loaded"
    );

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    let app = match App::build(&config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize");
            eprintln!("Initialization error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match app.execute(command).await {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render output: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

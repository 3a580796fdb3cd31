//! Contextual CLI — the main entry point.
//!
//! Commands:
//! - `init`      — Write a default config file
//! - `config`    — Show, validate or locate the configuration
//! - `assemble`  — Replay a transcript and print the assembled context

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "contextual",
    about = "Contextual — bounded context assembly for long conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.contextual/config.toml
    #[arg(short, long, global = true, env = "CONTEXTUAL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create ~/.contextual and a default config.toml
    Init,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Replay a JSONL transcript and print the context for its last turn
    Assemble {
        /// Transcript file, one {"role": ..., "content": ...} object per line
        #[arg(short, long)]
        transcript: PathBuf,

        /// Append this user query before assembling
        #[arg(short, long)]
        query: Option<String>,

        /// Override the token budget
        #[arg(short, long)]
        budget: Option<usize>,

        /// Override the recent-turn window
        #[arg(short, long)]
        window: Option<usize>,

        /// Print the full context and metadata as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Check the configuration for errors
    Validate,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `assemble` output stays pipeable.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
        },
        Commands::Assemble {
            transcript,
            query,
            budget,
            window,
            json,
        } => {
            let options = commands::assemble::AssembleOptions {
                transcript,
                query,
                budget,
                window,
                json,
            };
            commands::assemble::run(config_path, options).await?
        }
    }

    Ok(())
}

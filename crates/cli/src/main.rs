//! Tandem CLI: the main entry point.
//!
//! Commands:
//! - `run`     - Ask a question and drive the executor/critic loop
//! - `config`  - Show, validate, or locate the configuration

use clap::{Parser, Subcommand};

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "tandem",
    about = "Tandem: executor/critic agent loop with a human in the loop",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question and iterate on the answer
    Run {
        /// Question to start with instead of prompting for one
        #[arg(short, long)]
        question: Option<String>,

        /// Override loop.max_iterations
        #[arg(short, long)]
        max_iterations: Option<u32>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Check the configuration for errors
    Validate,
    /// Print the configuration file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout belongs to the loop; logs go to stderr
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            question,
            max_iterations,
        } => commands::run::run(question, max_iterations).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
    }

    Ok(())
}

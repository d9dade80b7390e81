//! Queue Probe CLI
//!
//! Command-line interface for verifying the queue worker of a hosting
//! application.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "qprobe")]
#[command(about = "Queue worker verification CLI", long_about = None)]
struct Cli {
    /// Hosting application URL
    #[arg(long, env = "QPROBE_URL", default_value = "http://localhost:8000")]
    url: String,

    /// Anti-forgery token sent with every request
    #[arg(long, env = "QPROBE_CSRF_TOKEN", hide_env_values = true)]
    csrf_token: Option<String>,

    /// Directory of the local verification history
    #[arg(long, env = "QPROBE_HISTORY_PATH")]
    history_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qprobe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.url, cli.csrf_token, cli.history_path)?;

    handle_command(cli.command, &config).await
}

//! inwatch - watch files and directories through inotify

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod cmd;
mod config;
mod logging;

use config::Config;

/// inwatch - Print filesystem change notifications as they happen
#[derive(Parser)]
#[command(name = "inwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/inwatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch paths and print every event until Ctrl-C
    Watch {
        /// Files or directories to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Comma-separated event names (default: from config)
        #[arg(short, long, value_delimiter = ',')]
        events: Vec<String>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Show the kernel's inotify limits
    Limits,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let _log_guard = logging::init(&config.log)?;

    match cli.command {
        Commands::Watch {
            paths,
            events,
            duration,
        } => cmd::watch::run(&paths, &events, duration.map(Duration::from_secs), &config).await,
        Commands::Limits => cmd::limits::run().await,
    }
}

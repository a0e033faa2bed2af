use clap::{Parser, Subcommand};
use eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub mod daemon;
pub mod history;
pub mod predict;
pub mod snapshot;
pub mod stats;

#[derive(Parser, Debug)]
#[command(author, version, about = "pscue - a learning command-line predictor", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Print ranked suggestions for an input line, one per line
    Predict {
        /// The partial command line to complete
        #[arg(value_name = "INPUT")]
        input: String,
    },

    /// Run the prediction daemon in the foreground
    Daemon,

    /// Show statistics about learned data
    Stats,

    /// Show recent command history, newest first
    History {
        /// How many entries to show
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },

    /// Export learned data to a JSON snapshot
    Export {
        /// Destination file
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Import a JSON snapshot into the learned data
    Import {
        /// Snapshot file to import
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Clear existing data instead of merging additively
        #[arg(long)]
        replace: bool,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);

    match cli.command {
        Cmd::Predict { input } => predict::run(&input).await,
        Cmd::Daemon => daemon::run().await,
        Cmd::Stats => stats::run().await,
        Cmd::History { count } => history::run(count).await,
        Cmd::Export { path } => snapshot::export(&path).await,
        Cmd::Import { path, replace } => snapshot::import(&path, replace).await,
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "pscue=debug" } else { "pscue=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

//! roundhouse - allocation/claim ledger indexer.
//!
//! Ingests decoded contract events into a journal, replays them into a
//! projection with checkpointing, and serves queries over the published
//! state.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// roundhouse - allocation/claim ledger indexer
#[derive(Parser, Debug)]
#[command(name = "roundhouse")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append decoded events from a JSONL file to the journal
    Ingest {
        /// Path to the journal database
        #[arg(long, default_value = "journal.db")]
        journal: PathBuf,

        /// JSONL file of event envelopes ('-' reads stdin)
        input: PathBuf,
    },

    /// Replay the journal and publish the projection
    Run(commands::run::RunArgs),

    /// Show journal and checkpoint positions
    Status {
        /// Path to the journal database
        #[arg(long, default_value = "journal.db")]
        journal: PathBuf,

        /// Path to the checkpoint database (defaults next to the journal)
        #[arg(long)]
        checkpoints: Option<PathBuf>,
    },

    /// Query the published projection
    Query(commands::query::QueryArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Ingest { journal, input } => commands::ingest::run(&journal, &input),
        Commands::Run(args) => commands::run::run(&args),
        Commands::Status {
            journal,
            checkpoints,
        } => commands::status::run(&journal, checkpoints.as_deref()),
        Commands::Query(args) => commands::query::run(&args),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}

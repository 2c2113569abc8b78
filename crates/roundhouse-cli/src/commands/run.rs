//! The replay command: journal in, projection out.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use roundhouse_core::{
    CheckpointStore, IndexerConfig, Projector, ReplayConfig, ReplayError, Replayer, SqliteJournal,
    SqliteStore, TracingSink,
};
use tracing::error;

/// Arguments for the `run` subcommand. Flags override values from the
/// config file when both are given.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to a TOML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the journal database
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// Publish the projection to this SQLite database after the replay
    #[arg(long)]
    pub state: Option<PathBuf>,

    /// Path to the checkpoint database
    #[arg(long)]
    pub checkpoints: Option<PathBuf>,

    /// Save a checkpoint after this many applied events
    #[arg(long)]
    pub checkpoint_interval: Option<u64>,

    /// Journal entries read per batch
    #[arg(long)]
    pub batch_size: Option<u64>,

    /// Ignore existing checkpoints and replay the full journal
    #[arg(long)]
    pub from_genesis: bool,
}

impl RunArgs {
    fn resolve(&self) -> Result<IndexerConfig> {
        let mut config = match &self.config {
            Some(path) => IndexerConfig::from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => IndexerConfig {
                journal_db: PathBuf::from("journal.db"),
                state_db: None,
                checkpoint_db: None,
                checkpoint_interval: ReplayConfig::default().checkpoint_interval,
                batch_size: ReplayConfig::default().batch_size,
            },
        };

        if let Some(journal) = &self.journal {
            config.journal_db.clone_from(journal);
        }
        if let Some(state) = &self.state {
            config.state_db = Some(state.clone());
        }
        if let Some(checkpoints) = &self.checkpoints {
            config.checkpoint_db = Some(checkpoints.clone());
        }
        if let Some(interval) = self.checkpoint_interval {
            config.checkpoint_interval = interval;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Replay the journal, checkpointing along the way, and publish the
/// final projection if a state database is configured.
pub fn run(args: &RunArgs) -> Result<()> {
    let config = args.resolve()?;

    let journal = SqliteJournal::open(&config.journal_db)
        .with_context(|| format!("failed to open journal at {}", config.journal_db.display()))?;
    let checkpoint_path = config.checkpoint_db_path();
    let checkpoints = CheckpointStore::open(&checkpoint_path).with_context(|| {
        format!(
            "failed to open checkpoint store at {}",
            checkpoint_path.display()
        )
    })?;

    let replayer = Replayer::new(
        &journal,
        &checkpoints,
        Projector::new(TracingSink),
        ReplayConfig {
            checkpoint_interval: config.checkpoint_interval,
            batch_size: config.batch_size,
        },
    );

    let result = if args.from_genesis {
        replayer.run_from_genesis()
    } else {
        replayer.run()
    };

    let (state, outcome) = match result {
        Ok(ok) => ok,
        Err(ReplayError::Halted { seq_id, source }) => {
            error!(seq_id, error = %source, "replay halted");
            bail!("replay halted at seq {seq_id}: {source}");
        },
        Err(other) => return Err(other.into()),
    };

    println!(
        "Replayed {} event(s) up to seq {} ({} checkpoint(s) written)",
        outcome.events_applied, outcome.last_seq_id, outcome.checkpoints_written,
    );

    if let Some(state_path) = &config.state_db {
        let mut durable = SqliteStore::open(state_path)
            .with_context(|| format!("failed to open state db at {}", state_path.display()))?;
        durable.import(&state).context("failed to publish projection")?;
        println!("Published projection to {}", state_path.display());
    }

    Ok(())
}

//! Journal and checkpoint status.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roundhouse_core::{CheckpointStore, CheckpointStoreError, PROJECTOR_NAME, SqliteJournal};

/// Print journal statistics and the latest checkpoint position.
pub fn run(journal_path: &Path, checkpoint_path: Option<&Path>) -> Result<()> {
    let journal = SqliteJournal::open(journal_path)
        .with_context(|| format!("failed to open journal at {}", journal_path.display()))?;
    let stats = journal.stats().context("failed to read journal stats")?;

    println!("Journal: {}", journal_path.display());
    println!("  events:     {}", stats.event_count);
    println!("  head seq:   {}", stats.max_seq_id);
    match (stats.first_block, stats.last_block) {
        (Some(first), Some(last)) => println!("  blocks:     {first}..={last}"),
        _ => println!("  blocks:     (empty)"),
    }

    let resolved = checkpoint_path.map_or_else(
        || {
            journal_path
                .parent()
                .map_or_else(PathBuf::new, Path::to_path_buf)
                .join("checkpoints.db")
        },
        Path::to_path_buf,
    );
    // Opening would create an empty database; a status read must not.
    if !resolved.exists() {
        println!("Checkpoint: none ({})", resolved.display());
        return Ok(());
    }

    let checkpoints = CheckpointStore::open(&resolved).with_context(|| {
        format!("failed to open checkpoint store at {}", resolved.display())
    })?;

    match checkpoints.load_latest(PROJECTOR_NAME) {
        Ok(checkpoint) => {
            println!("Checkpoint: seq {} ({})", checkpoint.seq_id, resolved.display());
            let behind = stats.max_seq_id.saturating_sub(checkpoint.seq_id);
            println!("  behind head by {behind} event(s)");
        },
        Err(CheckpointStoreError::NotFound { .. }) => {
            println!("Checkpoint: none ({})", resolved.display());
        },
        Err(e) => return Err(e).context("failed to read checkpoints"),
    }

    Ok(())
}

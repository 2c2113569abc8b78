//! The replay driver.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::checkpoint::{Checkpoint, CheckpointStore, CheckpointStoreError};
use crate::journal::{JournalError, SqliteJournal};
use crate::metadata::MetadataSink;
use crate::reducer::{PROJECTOR_NAME, Projector, ReduceError};
use crate::store::MemoryStore;

/// Tuning knobs for a replay run.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Save a checkpoint after this many applied events.
    pub checkpoint_interval: u64,

    /// Number of journal entries to read per batch.
    pub batch_size: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: 1_000,
            batch_size: 256,
        }
    }
}

/// Summary of a completed replay run.
#[derive(Debug, Clone, Default)]
pub struct ReplayOutcome {
    /// Sequence ID of the last applied event (0 if none).
    pub last_seq_id: u64,

    /// Number of events applied during this run.
    pub events_applied: u64,

    /// Number of checkpoints written during this run.
    pub checkpoints_written: u64,

    /// Sequence ID of the checkpoint the run resumed from, if any.
    pub resumed_from: Option<u64>,
}

/// Errors that can occur during a replay run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReplayError {
    /// Error reading from the journal.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// Error loading or saving a checkpoint.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointStoreError),

    /// Snapshot (de)serialization error.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The reducer hit a fatal condition. The projection is left exactly
    /// as it was before the offending event; recovery is an operator
    /// decision, not a retry.
    #[error("replay halted at seq_id={seq_id}: {source}")]
    Halted {
        /// Sequence ID of the event that could not be applied.
        seq_id: u64,
        /// The underlying reducer error.
        #[source]
        source: ReduceError,
    },
}

/// Drives the projector over the journal, checkpointing as it goes.
pub struct Replayer<'a, M: MetadataSink> {
    journal: &'a SqliteJournal,
    checkpoints: &'a CheckpointStore,
    projector: Projector<M>,
    config: ReplayConfig,
}

impl<'a, M: MetadataSink> Replayer<'a, M> {
    /// Creates a replayer over the given journal and checkpoint store.
    pub const fn new(
        journal: &'a SqliteJournal,
        checkpoints: &'a CheckpointStore,
        projector: Projector<M>,
        config: ReplayConfig,
    ) -> Self {
        Self {
            journal,
            checkpoints,
            projector,
            config,
        }
    }

    /// Replays from the latest checkpoint, or from genesis if none
    /// exists, up to the journal head.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Halted`] if the reducer hits a fatal
    /// condition, or an infrastructure error from the journal or
    /// checkpoint store.
    pub fn run(&self) -> Result<(MemoryStore, ReplayOutcome), ReplayError> {
        match self.checkpoints.load_latest(PROJECTOR_NAME) {
            Ok(checkpoint) => {
                let state: MemoryStore = serde_json::from_str(&checkpoint.state_json)?;
                info!(seq_id = checkpoint.seq_id, "resuming from checkpoint");
                self.run_inner(state, checkpoint.seq_id, Some(checkpoint.seq_id))
            },
            Err(CheckpointStoreError::NotFound { .. }) => {
                self.run_inner(MemoryStore::new(), 0, None)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Replays the full journal from genesis, ignoring any existing
    /// checkpoints. Checkpoints written along the way overwrite stale
    /// ones at the same positions.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn run_from_genesis(&self) -> Result<(MemoryStore, ReplayOutcome), ReplayError> {
        self.run_inner(MemoryStore::new(), 0, None)
    }

    fn run_inner(
        &self,
        mut state: MemoryStore,
        resume_seq_id: u64,
        resumed_from: Option<u64>,
    ) -> Result<(MemoryStore, ReplayOutcome), ReplayError> {
        let mut outcome = ReplayOutcome {
            last_seq_id: resume_seq_id,
            resumed_from,
            ..ReplayOutcome::default()
        };
        let mut since_checkpoint = 0u64;
        let mut cursor = resume_seq_id + 1;

        loop {
            let entries = self.journal.read_from(cursor, self.config.batch_size)?;
            if entries.is_empty() {
                break;
            }

            for entry in &entries {
                if let Err(source) = self.projector.apply(&mut state, &entry.envelope) {
                    warn!(
                        seq_id = entry.seq_id,
                        error = %source,
                        "replay halted on fatal reducer error"
                    );
                    return Err(ReplayError::Halted {
                        seq_id: entry.seq_id,
                        source,
                    });
                }

                outcome.last_seq_id = entry.seq_id;
                outcome.events_applied += 1;
                since_checkpoint += 1;

                if since_checkpoint >= self.config.checkpoint_interval {
                    self.save_checkpoint(&state, entry.seq_id)?;
                    outcome.checkpoints_written += 1;
                    since_checkpoint = 0;
                }
            }

            cursor = outcome.last_seq_id + 1;
        }

        // Pin the final position so the next run starts at the head.
        if since_checkpoint > 0 {
            self.save_checkpoint(&state, outcome.last_seq_id)?;
            outcome.checkpoints_written += 1;
        }

        info!(
            last_seq_id = outcome.last_seq_id,
            events_applied = outcome.events_applied,
            checkpoints = outcome.checkpoints_written,
            "replay complete"
        );
        Ok((state, outcome))
    }

    fn save_checkpoint(&self, state: &MemoryStore, seq_id: u64) -> Result<(), ReplayError> {
        let state_json = serde_json::to_string(state)?;
        self.checkpoints
            .save(&Checkpoint::new(PROJECTOR_NAME, seq_id, state_json))?;
        debug!(seq_id, "checkpoint saved");
        Ok(())
    }
}

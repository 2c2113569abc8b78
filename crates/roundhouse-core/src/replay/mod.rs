//! Replay driver and checkpoint storage.
//!
//! The [`Replayer`] drives the projector over the journal: restore the
//! latest checkpoint (or start from genesis), apply events in sequence
//! order, save checkpoints at configured intervals plus once at the end
//! of the run, and halt on the first fatal reducer error.
//!
//! Checkpoints are serialized [`crate::store::MemoryStore`] snapshots
//! stored in a `SQLite` database separate from the journal, so they can
//! always be rebuilt from the journal if lost.

mod checkpoint;
mod runner;

#[cfg(test)]
mod tests;

pub use checkpoint::{Checkpoint, CheckpointStore, CheckpointStoreError};
pub use runner::{ReplayConfig, ReplayError, ReplayOutcome, Replayer};

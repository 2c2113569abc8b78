//! roundhouse-core - allocation/claim ledger reconstruction.
//!
//! This crate rebuilds an auditable ledger of token allocations, claims,
//! deposits and withdrawals from an ordered stream of decoded contract
//! events, and exposes the result as a queryable projection (balances per
//! token and category, per-user allocation records, rounds, donations,
//! global counters).
//!
//! # Architecture
//!
//! ```text
//! Events (Journal) --> Projector --> Projection State (StateStore)
//!                         |
//!                    Checkpoint
//! ```
//!
//! - [`journal`] holds the local append-only copy of the decoded event
//!   stream in `(block, log)` order.
//! - [`reducer`] is the sequential reducer: one handler per event kind,
//!   each running to completion before the next event is applied.
//! - [`store`] is the projection output boundary, with an in-memory
//!   implementation used during replay and a durable `SQLite` one for
//!   downstream queries.
//! - [`replay`] drives the reducer over the journal with checkpointing.
//!
//! # Determinism
//!
//! The reducer is deterministic: given the same journal, it must produce
//! the same projection state, whether replayed from genesis or resumed
//! from a checkpoint. Property tests verify both.

pub mod config;
pub mod event;
pub mod journal;
pub mod metadata;
pub mod reducer;
pub mod replay;
pub mod state;
pub mod store;

pub use config::{ConfigError, IndexerConfig};
pub use event::{ChainEvent, EventEnvelope};
pub use journal::{JournalEntry, JournalError, JournalStats, SqliteJournal};
pub use metadata::{MetadataSink, NoopSink, RecordingSink, TracingSink};
pub use reducer::{PROJECTOR_NAME, Projector, ReduceError};
pub use replay::{
    Checkpoint, CheckpointStore, CheckpointStoreError, ReplayConfig, ReplayError, ReplayOutcome,
    Replayer,
};
pub use state::{
    AllocationKey, AllocationRecord, BalanceAggregate, BalanceKey, BalanceKind, CurrentRound,
    Donation, DonationId, GlobalStats, Round, RoundId, User,
};
pub use store::{MemoryStore, SqliteStore, StateStore, StoreError};

//! Projection state storage.
//!
//! The [`StateStore`] trait is the reducer's only way to read or write
//! projection state, keeping the handlers free of hidden side-channel
//! reads. Two implementations ship:
//!
//! - [`MemoryStore`]: the replay working set. Snapshotable (serde) for
//!   checkpoints and comparable (`PartialEq`) for determinism tests.
//! - [`SqliteStore`]: the durable, queryable output consumed by
//!   dashboards and eligibility checks.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
use thiserror::Error;

use crate::state::{
    AllocationKey, AllocationRecord, BalanceKey, CurrentRound, Donation, DonationId, GlobalStats,
    Round, RoundId, User,
};
use alloy_primitives::{Address, I256};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted value could not be parsed back into its typed form.
    #[error("corrupt stored value for {entity}: {details}")]
    Corrupt {
        /// Entity the value belongs to.
        entity: &'static str,
        /// What failed to parse.
        details: String,
    },
}

/// The projection output boundary.
///
/// All methods are total lookups or upserts; `delete_allocation` is the
/// only removal the reducer ever performs. [`MemoryStore`] never returns
/// `Err` from any of these.
pub trait StateStore {
    /// Looks up a user by address.
    fn user(&self, address: Address) -> Result<Option<User>, StoreError>;

    /// Inserts or replaces a user.
    fn put_user(&mut self, user: &User) -> Result<(), StoreError>;

    /// Looks up a donation by its (transaction, log) identity.
    fn donation(&self, id: DonationId) -> Result<Option<Donation>, StoreError>;

    /// Appends a donation record.
    fn put_donation(&mut self, donation: &Donation) -> Result<(), StoreError>;

    /// Looks up a round by id.
    fn round(&self, id: RoundId) -> Result<Option<Round>, StoreError>;

    /// Inserts or replaces a round.
    fn put_round(&mut self, round: &Round) -> Result<(), StoreError>;

    /// Reads the current-round pointer, if any round was ever promoted.
    fn current_round(&self) -> Result<Option<CurrentRound>, StoreError>;

    /// Overwrites the current-round pointer (last write wins).
    fn set_current_round(&mut self, current: &CurrentRound) -> Result<(), StoreError>;

    /// Reads the aggregate amount for a (token, category) key.
    ///
    /// Missing aggregates read as zero; they are materialized on first
    /// write.
    fn balance(&self, key: BalanceKey) -> Result<I256, StoreError>;

    /// Writes the aggregate amount for a (token, category) key.
    fn put_balance(&mut self, key: BalanceKey, amount: I256) -> Result<(), StoreError>;

    /// Looks up an allocation record by its (user, token, round) identity.
    fn allocation(&self, key: AllocationKey) -> Result<Option<AllocationRecord>, StoreError>;

    /// Inserts or replaces an allocation record.
    fn put_allocation(&mut self, record: &AllocationRecord) -> Result<(), StoreError>;

    /// Deletes an allocation record. Deleting a missing record is a
    /// no-op.
    fn delete_allocation(&mut self, key: AllocationKey) -> Result<(), StoreError>;

    /// Reads the global counters. Missing counters read as zero.
    fn global_stats(&self) -> Result<GlobalStats, StoreError>;

    /// Writes the global counters.
    fn put_global_stats(&mut self, stats: &GlobalStats) -> Result<(), StoreError>;

    /// Returns the existing user for `address`, creating one with
    /// `created_at` if none exists yet. Idempotent: a later call never
    /// overwrites the original `created_at`.
    fn ensure_user(&mut self, address: Address, created_at: u64) -> Result<User, StoreError> {
        if let Some(user) = self.user(address)? {
            return Ok(user);
        }
        let user = User {
            address,
            created_at,
        };
        self.put_user(&user)?;
        Ok(user)
    }
}

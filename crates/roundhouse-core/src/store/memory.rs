//! In-memory projection store.
//!
//! This is the reducer's working set during replay. It serializes to a
//! deterministic snapshot form (sorted vectors) so that checkpoints are
//! byte-stable and determinism tests can compare whole states.

use std::collections::HashMap;

use alloy_primitives::{Address, I256};
use serde::{Deserialize, Serialize};

use super::{StateStore, StoreError};
use crate::state::{
    AllocationKey, AllocationRecord, BalanceAggregate, BalanceKey, CurrentRound, Donation,
    DonationId, GlobalStats, Round, RoundId, User,
};

/// `HashMap`-backed [`StateStore`]. Never returns `Err`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Snapshot", into = "Snapshot")]
pub struct MemoryStore {
    users: HashMap<Address, User>,
    donations: HashMap<DonationId, Donation>,
    rounds: HashMap<RoundId, Round>,
    current_round: Option<CurrentRound>,
    balances: HashMap<BalanceKey, BalanceAggregate>,
    allocations: HashMap<AllocationKey, AllocationRecord>,
    stats: GlobalStats,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live allocation records.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// Number of donation records.
    #[must_use]
    pub fn donation_count(&self) -> usize {
        self.donations.len()
    }

    /// Iterates over all users.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Iterates over all donations.
    pub fn donations(&self) -> impl Iterator<Item = &Donation> {
        self.donations.values()
    }

    /// Iterates over all rounds.
    pub fn rounds(&self) -> impl Iterator<Item = &Round> {
        self.rounds.values()
    }

    /// Iterates over all materialized balance aggregates.
    pub fn balances(&self) -> impl Iterator<Item = &BalanceAggregate> {
        self.balances.values()
    }

    /// Iterates over all live allocation records.
    pub fn allocations(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.allocations.values()
    }
}

impl StateStore for MemoryStore {
    fn user(&self, address: Address) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&address).copied())
    }

    fn put_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.users.insert(user.address, *user);
        Ok(())
    }

    fn donation(&self, id: DonationId) -> Result<Option<Donation>, StoreError> {
        Ok(self.donations.get(&id).cloned())
    }

    fn put_donation(&mut self, donation: &Donation) -> Result<(), StoreError> {
        self.donations.insert(donation.id, donation.clone());
        Ok(())
    }

    fn round(&self, id: RoundId) -> Result<Option<Round>, StoreError> {
        Ok(self.rounds.get(&id).cloned())
    }

    fn put_round(&mut self, round: &Round) -> Result<(), StoreError> {
        self.rounds.insert(round.id, round.clone());
        Ok(())
    }

    fn current_round(&self) -> Result<Option<CurrentRound>, StoreError> {
        Ok(self.current_round)
    }

    fn set_current_round(&mut self, current: &CurrentRound) -> Result<(), StoreError> {
        self.current_round = Some(*current);
        Ok(())
    }

    fn balance(&self, key: BalanceKey) -> Result<I256, StoreError> {
        Ok(self.balances.get(&key).map_or(I256::ZERO, |b| b.amount))
    }

    fn put_balance(&mut self, key: BalanceKey, amount: I256) -> Result<(), StoreError> {
        self.balances.insert(
            key,
            BalanceAggregate {
                token: key.token,
                kind: key.kind,
                amount,
            },
        );
        Ok(())
    }

    fn allocation(&self, key: AllocationKey) -> Result<Option<AllocationRecord>, StoreError> {
        Ok(self.allocations.get(&key).cloned())
    }

    fn put_allocation(&mut self, record: &AllocationRecord) -> Result<(), StoreError> {
        self.allocations.insert(record.key(), record.clone());
        Ok(())
    }

    fn delete_allocation(&mut self, key: AllocationKey) -> Result<(), StoreError> {
        self.allocations.remove(&key);
        Ok(())
    }

    fn global_stats(&self) -> Result<GlobalStats, StoreError> {
        Ok(self.stats)
    }

    fn put_global_stats(&mut self, stats: &GlobalStats) -> Result<(), StoreError> {
        self.stats = *stats;
        Ok(())
    }
}

/// Deterministic serialized form of a [`MemoryStore`].
///
/// Vectors are sorted by entity identity so the same state always
/// serializes to the same bytes, regardless of hash-map iteration
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    users: Vec<User>,
    donations: Vec<Donation>,
    rounds: Vec<Round>,
    current_round: Option<CurrentRound>,
    balances: Vec<BalanceAggregate>,
    allocations: Vec<AllocationRecord>,
    stats: GlobalStats,
}

impl From<MemoryStore> for Snapshot {
    fn from(store: MemoryStore) -> Self {
        let mut users: Vec<User> = store.users.into_values().collect();
        users.sort_by_key(|u| u.address);

        let mut donations: Vec<Donation> = store.donations.into_values().collect();
        donations.sort_by_key(|d| d.id);

        let mut rounds: Vec<Round> = store.rounds.into_values().collect();
        rounds.sort_by_key(|r| r.id);

        let mut balances: Vec<BalanceAggregate> = store.balances.into_values().collect();
        balances.sort_by_key(BalanceAggregate::key);

        let mut allocations: Vec<AllocationRecord> = store.allocations.into_values().collect();
        allocations.sort_by_key(AllocationRecord::key);

        Self {
            users,
            donations,
            rounds,
            current_round: store.current_round,
            balances,
            allocations,
            stats: store.stats,
        }
    }
}

impl From<Snapshot> for MemoryStore {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            users: snapshot.users.into_iter().map(|u| (u.address, u)).collect(),
            donations: snapshot.donations.into_iter().map(|d| (d.id, d)).collect(),
            rounds: snapshot.rounds.into_iter().map(|r| (r.id, r)).collect(),
            current_round: snapshot.current_round,
            balances: snapshot.balances.into_iter().map(|b| (b.key(), b)).collect(),
            allocations: snapshot
                .allocations
                .into_iter()
                .map(|a| (a.key(), a))
                .collect(),
            stats: snapshot.stats,
        }
    }
}

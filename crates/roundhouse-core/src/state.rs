//! Projection entities and their typed identities.
//!
//! Everything the reducer writes lives here: per-(user, token, round)
//! allocation records, per-(token, category) balance aggregates, rounds
//! and the current-round pointer, the donation ledger, users, and the
//! global counters. All entities are plain serde structs so the whole
//! projection can be snapshotted for checkpoints.
//!
//! Stored amounts are signed 256-bit ([`I256`]): the reducer enforces no
//! floor on aggregates, so the held balance of a token can legitimately
//! go negative when withdraw volume exceeds recorded deposits.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, B256, I256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A round is identified by the hash of the transaction that created it.
pub type RoundId = B256;

/// Balance category tracked per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum BalanceKind {
    /// Tokens currently held by the pool (deposits minus withdrawals and
    /// claims).
    Held,
    /// Tokens allocated to users in the current round.
    Allocated,
    /// Tokens claimed by users across all rounds.
    Claimed,
}

impl BalanceKind {
    /// Returns all balance kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Held, Self::Allocated, Self::Claimed]
    }

    /// Returns the string representation used in storage keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "HELD",
            Self::Allocated => "ALLOCATED",
            Self::Claimed => "CLAIMED",
        }
    }
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing a [`BalanceKind`] from a string.
#[derive(Debug, Error)]
#[error("unknown balance kind: {0:?} (expected HELD, ALLOCATED or CLAIMED)")]
pub struct ParseBalanceKindError(String);

impl FromStr for BalanceKind {
    type Err = ParseBalanceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HELD" => Ok(Self::Held),
            "ALLOCATED" => Ok(Self::Allocated),
            "CLAIMED" => Ok(Self::Claimed),
            _ => Err(ParseBalanceKindError(s.to_string())),
        }
    }
}

/// Identity of a [`BalanceAggregate`]: (token, category).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BalanceKey {
    /// Token contract address.
    pub token: Address,
    /// Balance category.
    pub kind: BalanceKind,
}

/// A running total per token and category. Never deleted once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAggregate {
    /// Token contract address.
    pub token: Address,
    /// Balance category.
    pub kind: BalanceKind,
    /// Running total. May be negative; the reducer enforces no floor.
    pub amount: I256,
}

impl BalanceAggregate {
    /// Creates a zeroed aggregate for a key.
    #[must_use]
    pub const fn zero(key: BalanceKey) -> Self {
        Self {
            token: key.token,
            kind: key.kind,
            amount: I256::ZERO,
        }
    }

    /// Returns the identity of this aggregate.
    #[must_use]
    pub const fn key(&self) -> BalanceKey {
        BalanceKey {
            token: self.token,
            kind: self.kind,
        }
    }
}

/// Identity of an [`AllocationRecord`]: (user, token, round).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AllocationKey {
    /// User the allocation is for.
    pub user: Address,
    /// Token contract address.
    pub token: Address,
    /// Round the allocation is scoped to.
    pub round: RoundId,
}

impl fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.user, self.token, self.round)
    }
}

/// Per-(user, token, round) allocation tracking.
///
/// Created on the first non-zero allocation-set event for its key,
/// deleted when an allocation-set event clears the amount to zero.
/// `claimed_amount` is only ever increased, never decreased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// User the allocation is for.
    pub user: Address,
    /// Token contract address.
    pub token: Address,
    /// Round the allocation is scoped to.
    pub round: RoundId,
    /// Currently allocated amount.
    pub amount: I256,
    /// Total amount claimed against this record.
    pub claimed_amount: I256,
    /// Timestamp of the last allocation-set event that touched this
    /// record.
    pub updated_at: u64,
    /// Timestamp of the most recent claim, if any.
    pub claimed_at: Option<u64>,
}

impl AllocationRecord {
    /// Creates a fresh record with nothing claimed yet.
    #[must_use]
    pub const fn new(key: AllocationKey, amount: I256, updated_at: u64) -> Self {
        Self {
            user: key.user,
            token: key.token,
            round: key.round,
            amount,
            claimed_amount: I256::ZERO,
            updated_at,
            claimed_at: None,
        }
    }

    /// Returns the identity of this record.
    #[must_use]
    pub const fn key(&self) -> AllocationKey {
        AllocationKey {
            user: self.user,
            token: self.token,
            round: self.round,
        }
    }
}

/// A funding round. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Hash of the transaction that announced the round.
    pub id: RoundId,
    /// Round start time (unix seconds).
    pub start: u64,
    /// Round end time (unix seconds).
    pub end: u64,
    /// Block timestamp of the announcing event.
    pub created_at: u64,
    /// Content identifier of the round metadata document, if one could
    /// be extracted from the announcement.
    pub metadata: Option<String>,
}

/// The singleton current-round pointer.
///
/// One writer (the round handler), "last RoundUpdated event wins". A
/// round announced without a usable metadata reference is persisted but
/// never promoted, so the pointer keeps its prior value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRound {
    /// The round considered active for new allocations and claims.
    pub round: RoundId,
    /// Block timestamp of the promoting event.
    pub updated_at: u64,
}

/// Identity of a [`Donation`]: the emitting (transaction, log) pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DonationId {
    /// Hash of the transaction that emitted the deposit.
    pub tx_hash: B256,
    /// Position of the log within the block.
    pub log_index: u64,
}

impl fmt::Display for DonationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tx_hash, self.log_index)
    }
}

/// An append-only deposit record. Withdrawals have no ledger entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donation {
    /// Identity derived from the emitting log.
    pub id: DonationId,
    /// Depositing user.
    pub user: Address,
    /// Token contract address.
    pub token: Address,
    /// Deposited amount.
    pub amount: U256,
    /// Block timestamp of the deposit.
    pub timestamp: u64,
}

/// A user, created idempotently by the first event that mentions the
/// address. Never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// The user's address.
    pub address: Address,
    /// Block timestamp of the first event that mentioned the address.
    pub created_at: u64,
}

/// Singleton global counters, incremented by the reducer. Never
/// decremented or reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalStats {
    /// Number of allocation-set events that reached the stats step
    /// (clear-to-zero events do not count).
    pub times_allocated: u64,
    /// Number of successful claims.
    pub times_claimed: u64,
}

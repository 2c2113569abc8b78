//! Decoded contract events and their ordering envelope.
//!
//! The upstream decoder delivers one [`EventEnvelope`] at a time, in a
//! fixed total order given by `(block_number, log_index)`. The envelope
//! carries the chain context every handler needs (block timestamp,
//! transaction hash, log position); the event-specific fields live in
//! [`ChainEvent`].

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::state::DonationId;

/// A decoded contract event.
///
/// Amounts are the raw unsigned 256-bit values carried by the log; the
/// reducer converts them to signed form at its boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainEvent {
    /// A token deposit into the pool.
    Deposit {
        /// Address that made the deposit.
        depositor: Address,
        /// Token contract address.
        token: Address,
        /// Deposited amount.
        amount: U256,
    },

    /// A token withdrawal from the pool. Carries no user field.
    Withdraw {
        /// Token contract address.
        token: Address,
        /// Withdrawn amount.
        amount: U256,
    },

    /// The allowed allocation for (user, token) in the current round was
    /// set to a new value.
    AllocationSet {
        /// User the allocation is for.
        user: Address,
        /// Token contract address.
        token: Address,
        /// The new allocated amount (zero clears the allocation).
        new_amount: U256,
    },

    /// A user claimed part (or all) of their allocation.
    Claimed {
        /// Address that claimed.
        claimant: Address,
        /// Token contract address.
        token: Address,
        /// Claimed amount.
        amount: U256,
    },

    /// A new funding round was announced.
    RoundUpdated {
        /// Round start time (unix seconds).
        start: u64,
        /// Round end time (unix seconds).
        end: u64,
        /// Metadata URI, typically `ipfs://<cid>`. May be empty.
        metadata_uri: String,
    },
}

impl ChainEvent {
    /// Returns the event kind as a static string, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Withdraw { .. } => "withdraw",
            Self::AllocationSet { .. } => "allocation_set",
            Self::Claimed { .. } => "claimed",
            Self::RoundUpdated { .. } => "round_updated",
        }
    }
}

/// A [`ChainEvent`] together with its chain context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Block the event was emitted in.
    pub block_number: u64,

    /// Block timestamp (unix seconds).
    pub block_timestamp: u64,

    /// Hash of the transaction that emitted the event.
    pub tx_hash: B256,

    /// Position of the log within the block.
    pub log_index: u64,

    /// The decoded event.
    pub event: ChainEvent,
}

impl EventEnvelope {
    /// The total-order key for this envelope.
    ///
    /// Events are applied in strictly increasing `(block, log)` order;
    /// the journal rejects appends that would violate this.
    #[must_use]
    pub const fn order_key(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }

    /// The derived per-event identity, `<tx_hash>-<log_index>`.
    ///
    /// Used wherever a record needs a unique id tied to the emitting
    /// log, e.g. [`crate::state::Donation`].
    #[must_use]
    pub const fn event_id(&self) -> DonationId {
        DonationId {
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }
}

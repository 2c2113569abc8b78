//! The sequential event reducer.
//!
//! [`Projector::apply`] consumes one [`EventEnvelope`] at a time, in the
//! journal's total order, and runs the matching handler to completion
//! before returning. Handlers perform every fallible precondition check
//! before their first write, so a fatal error never leaves
//! partially-applied state behind.
//!
//! The handlers themselves live in submodules:
//!
//! - [`allocations`]: the allocation-set reconciliation (replace,
//!   top-up, clear-to-zero) and claim handling,
//! - [`rounds`]: round creation and current-round promotion,
//! - [`donations`]: the deposit ledger and withdrawals.

mod allocations;
mod donations;
mod rounds;


use alloy_primitives::{Address, I256, U256};
use thiserror::Error;
use tracing::debug;

use crate::event::{ChainEvent, EventEnvelope};
use crate::metadata::MetadataSink;
use crate::state::{AllocationKey, BalanceKey, BalanceKind, RoundId};
use crate::store::{StateStore, StoreError};

/// Name under which this projection checkpoints its state.
pub const PROJECTOR_NAME: &str = "roundhouse-projection";

/// Fatal reducer errors. Any of these halts the processing run; recovery
/// is a replay from the last checkpoint, driven externally.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReduceError {
    /// A claim referenced a (user, token, round) with no allocation
    /// record. Signals a logic error or out-of-order delivery; detected
    /// before any write.
    #[error("claim by {user} for token {token} has no allocation in round {round}")]
    UnallocatedClaim {
        /// The claiming user.
        user: Address,
        /// The claimed token.
        token: Address,
        /// The round the claim was scoped to.
        round: RoundId,
    },

    /// An allocation-set or claim event arrived before any round was
    /// promoted current.
    #[error("no current round: a {event_kind} event arrived before any round was promoted")]
    NoCurrentRound {
        /// Kind of the event that needed a current round.
        event_kind: &'static str,
    },

    /// 256-bit signed arithmetic overflowed. Unreachable for well-formed
    /// chain amounts; present because stored amounts are fixed-width.
    #[error("signed 256-bit overflow while {context}")]
    AmountOverflow {
        /// The operation that overflowed.
        context: &'static str,
    },

    /// Error from the projection store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The event-stream projector.
///
/// Holds the metadata-fetch sink; all projection state flows through
/// the [`StateStore`] passed to [`apply`](Self::apply), keeping the
/// reducer itself free of hidden state.
#[derive(Debug, Clone, Default)]
pub struct Projector<M: MetadataSink> {
    metadata: M,
}

impl<M: MetadataSink> Projector<M> {
    /// Creates a projector with the given metadata sink.
    pub const fn new(metadata: M) -> Self {
        Self { metadata }
    }

    /// Applies one event to the projection.
    ///
    /// # Errors
    ///
    /// Returns a [`ReduceError`] on any fatal condition; the store is
    /// left exactly as it was before the call.
    pub fn apply<S: StateStore>(
        &self,
        store: &mut S,
        envelope: &EventEnvelope,
    ) -> Result<(), ReduceError> {
        debug!(
            block = envelope.block_number,
            log = envelope.log_index,
            kind = envelope.event.kind(),
            "applying event"
        );

        match &envelope.event {
            ChainEvent::Deposit {
                depositor,
                token,
                amount,
            } => donations::apply_deposit(
                store,
                envelope.event_id(),
                *depositor,
                *token,
                *amount,
                envelope.block_timestamp,
            ),
            ChainEvent::Withdraw { token, amount } => {
                donations::apply_withdraw(store, *token, *amount)
            },
            ChainEvent::AllocationSet {
                user,
                token,
                new_amount,
            } => {
                let round = require_current_round(store, "allocation-set")?;
                allocations::apply_allocation_set(
                    store,
                    AllocationKey {
                        user: *user,
                        token: *token,
                        round,
                    },
                    *new_amount,
                    envelope.block_timestamp,
                )
            },
            ChainEvent::Claimed {
                claimant,
                token,
                amount,
            } => {
                let round = require_current_round(store, "claim")?;
                allocations::apply_claim(
                    store,
                    AllocationKey {
                        user: *claimant,
                        token: *token,
                        round,
                    },
                    *amount,
                    envelope.block_timestamp,
                )
            },
            ChainEvent::RoundUpdated {
                start,
                end,
                metadata_uri,
            } => rounds::apply_round_updated(
                store,
                &self.metadata,
                envelope.tx_hash,
                *start,
                *end,
                metadata_uri,
                envelope.block_timestamp,
            ),
        }
    }
}

/// Resolves the current round id, failing fatally if none was ever
/// promoted. The round is resolved once per event and passed into the
/// handlers explicitly.
fn require_current_round<S: StateStore>(
    store: &S,
    event_kind: &'static str,
) -> Result<RoundId, ReduceError> {
    store
        .current_round()?
        .map(|current| current.round)
        .ok_or(ReduceError::NoCurrentRound { event_kind })
}

/// Converts an unsigned event amount into the signed stored form.
pub(crate) fn to_signed(amount: U256, context: &'static str) -> Result<I256, ReduceError> {
    I256::try_from(amount).map_err(|_| ReduceError::AmountOverflow { context })
}

/// Adds `delta` to the (token, kind) aggregate. Missing aggregates
/// start at zero; no floor is enforced.
pub(crate) fn credit_balance<S: StateStore>(
    store: &mut S,
    token: Address,
    kind: BalanceKind,
    delta: I256,
) -> Result<(), ReduceError> {
    let key = BalanceKey { token, kind };
    let current = store.balance(key)?;
    let next = current
        .checked_add(delta)
        .ok_or(ReduceError::AmountOverflow {
            context: "crediting a balance aggregate",
        })?;
    store.put_balance(key, next)?;
    Ok(())
}

/// Subtracts `delta` from the (token, kind) aggregate.
pub(crate) fn debit_balance<S: StateStore>(
    store: &mut S,
    token: Address,
    kind: BalanceKind,
    delta: I256,
) -> Result<(), ReduceError> {
    let key = BalanceKey { token, kind };
    let current = store.balance(key)?;
    let next = current
        .checked_sub(delta)
        .ok_or(ReduceError::AmountOverflow {
            context: "debiting a balance aggregate",
        })?;
    store.put_balance(key, next)?;
    Ok(())
}

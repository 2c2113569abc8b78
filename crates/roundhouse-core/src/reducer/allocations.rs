//! Allocation-set reconciliation and claim handling.
//!
//! The allocation-set handler selects one of three update policies from
//! the record's state before the event:
//!
//! - **clear**: `new_amount == 0` removes the record and backs its
//!   amount out of the ALLOCATED aggregate,
//! - **top-up**: a fully-claimed record (`claimed_amount == amount > 0`)
//!   keeps its claim history and grows additively,
//! - **replace**: everything else overwrites the amount, backing the old
//!   amount out of the aggregate first.
//!
//! A brand-new record takes the replace branch with its amount already
//! set to the new value, so the aggregate is debited and re-credited by
//! the same quantity and nets zero. That cancellation is upstream
//! behavior this projection must reproduce for replay parity; see
//! DESIGN.md before changing it.

use alloy_primitives::{I256, U256};
use tracing::debug;

use super::{ReduceError, credit_balance, debit_balance, to_signed};
use crate::state::{AllocationKey, AllocationRecord, BalanceKind};
use crate::store::StateStore;

/// Applies an allocation-set event for `key` in the current round.
pub(super) fn apply_allocation_set<S: StateStore>(
    store: &mut S,
    key: AllocationKey,
    new_amount: U256,
    timestamp: u64,
) -> Result<(), ReduceError> {
    let new_amount = to_signed(new_amount, "converting an allocation amount")?;
    store.ensure_user(key.user, timestamp)?;

    // Clear-to-zero: drop the record and back its amount out of the
    // aggregate. No stats update.
    if new_amount == I256::ZERO {
        if let Some(record) = store.allocation(key)? {
            debit_balance(store, key.token, BalanceKind::Allocated, record.amount)?;
            store.delete_allocation(key)?;
            debug!(key = %key, "cleared allocation");
        }
        return Ok(());
    }

    let mut record = match store.allocation(key)? {
        Some(record) => record,
        None => AllocationRecord::new(key, new_amount, timestamp),
    };

    // Policy is decided from the record's state before this event.
    let fully_claimed =
        record.claimed_amount > I256::ZERO && record.claimed_amount == record.amount;

    if fully_claimed {
        // Top-up: the prior amount was claimed in full; keep the claim
        // history and grow additively.
        record.amount =
            record
                .amount
                .checked_add(new_amount)
                .ok_or(ReduceError::AmountOverflow {
                    context: "topping up an allocation",
                })?;
    } else {
        // Replace: back the old amount out of the aggregate before
        // overwriting. For a record created just above, the "old"
        // amount is already the new one, so this debit cancels the
        // unconditional credit below.
        if record.amount > I256::ZERO {
            debit_balance(store, key.token, BalanceKind::Allocated, record.amount)?;
        }
        record.amount = new_amount;
    }

    record.updated_at = timestamp;
    store.put_allocation(&record)?;

    credit_balance(store, key.token, BalanceKind::Allocated, new_amount)?;

    let mut stats = store.global_stats()?;
    stats.times_allocated += 1;
    store.put_global_stats(&stats)?;
    Ok(())
}

/// Applies a claim event against the allocation for `key`.
///
/// The existence check runs strictly before any write: a failed claim
/// leaves the store untouched, including user records.
pub(super) fn apply_claim<S: StateStore>(
    store: &mut S,
    key: AllocationKey,
    amount: U256,
    timestamp: u64,
) -> Result<(), ReduceError> {
    let Some(mut record) = store.allocation(key)? else {
        return Err(ReduceError::UnallocatedClaim {
            user: key.user,
            token: key.token,
            round: key.round,
        });
    };
    let amount = to_signed(amount, "converting a claim amount")?;

    store.ensure_user(key.user, timestamp)?;

    // No bound check against record.amount: over-claims are upstream's
    // responsibility.
    record.claimed_amount =
        record
            .claimed_amount
            .checked_add(amount)
            .ok_or(ReduceError::AmountOverflow {
                context: "accumulating a claimed amount",
            })?;
    record.claimed_at = Some(timestamp);
    store.put_allocation(&record)?;

    debit_balance(store, key.token, BalanceKind::Held, amount)?;
    credit_balance(store, key.token, BalanceKind::Claimed, amount)?;

    let mut stats = store.global_stats()?;
    stats.times_claimed += 1;
    store.put_global_stats(&stats)?;
    Ok(())
}

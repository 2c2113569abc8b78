//! Deposit ledger and withdrawal handling.

use alloy_primitives::{Address, U256};

use super::{ReduceError, credit_balance, debit_balance, to_signed};
use crate::state::{BalanceKind, Donation, DonationId};
use crate::store::StateStore;

/// Applies a deposit: resolves the depositor, appends a donation record
/// and credits the HELD aggregate.
pub(super) fn apply_deposit<S: StateStore>(
    store: &mut S,
    id: DonationId,
    depositor: Address,
    token: Address,
    amount: U256,
    timestamp: u64,
) -> Result<(), ReduceError> {
    let signed = to_signed(amount, "converting a deposit amount")?;
    let user = store.ensure_user(depositor, timestamp)?;

    store.put_donation(&Donation {
        id,
        user: user.address,
        token,
        amount,
        timestamp,
    })?;

    credit_balance(store, token, BalanceKind::Held, signed)
}

/// Applies a withdrawal: debits the HELD aggregate.
///
/// Withdrawals carry no user and leave no ledger entity; there is no
/// floor check, so the aggregate goes negative when withdraw volume
/// exceeds recorded deposits.
pub(super) fn apply_withdraw<S: StateStore>(
    store: &mut S,
    token: Address,
    amount: U256,
) -> Result<(), ReduceError> {
    let signed = to_signed(amount, "converting a withdrawal amount")?;
    debit_balance(store, token, BalanceKind::Held, signed)
}

//! Queries over the published projection, printed as JSON.

use std::path::PathBuf;

use alloy_primitives::{Address, B256};
use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use roundhouse_core::{AllocationKey, BalanceKey, BalanceKind, DonationId, SqliteStore, StateStore};
use serde::Serialize;

/// Arguments for the `query` subcommand.
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Path to the published projection database
    #[arg(long, default_value = "state.db")]
    pub state: PathBuf,

    #[command(subcommand)]
    pub what: QueryCommand,
}

#[derive(Subcommand, Debug)]
pub enum QueryCommand {
    /// A per-token balance aggregate (missing aggregates read as zero)
    Balance {
        /// Token contract address
        token: Address,

        /// Balance category (held, allocated, claimed)
        kind: BalanceKind,
    },

    /// An allocation record by (user, token, round)
    Allocation {
        /// User address
        user: Address,

        /// Token contract address
        token: Address,

        /// Round ID
        round: B256,
    },

    /// A round by ID
    Round {
        /// Round ID
        id: B256,
    },

    /// The currently promoted round
    CurrentRound,

    /// Global allocation/claim counters
    Stats,

    /// A donation by its emitting (transaction, log) pair
    Donation {
        /// Transaction hash
        tx_hash: B256,

        /// Log index within the transaction
        log_index: u64,
    },

    /// A user by address
    User {
        /// User address
        address: Address,
    },
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run a query against the projection and print the result as JSON.
///
/// Entity lookups that find nothing are an error, so scripts can branch
/// on the exit code; balance lookups return zero instead, matching the
/// projection's read semantics.
pub fn run(args: &QueryArgs) -> Result<()> {
    let store = SqliteStore::open(&args.state)
        .with_context(|| format!("failed to open state db at {}", args.state.display()))?;

    match &args.what {
        QueryCommand::Balance { token, kind } => {
            let amount = store.balance(BalanceKey {
                token: *token,
                kind: *kind,
            })?;
            print_json(&serde_json::json!({
                "token": token,
                "kind": kind.as_str(),
                "amount": amount.to_string(),
            }))
        },
        QueryCommand::Allocation { user, token, round } => {
            let key = AllocationKey {
                user: *user,
                token: *token,
                round: *round,
            };
            match store.allocation(key)? {
                Some(record) => print_json(&record),
                None => bail!("no allocation record for {key}"),
            }
        },
        QueryCommand::Round { id } => match store.round(*id)? {
            Some(round) => print_json(&round),
            None => bail!("no round with id {id}"),
        },
        QueryCommand::CurrentRound => match store.current_round()? {
            Some(current) => print_json(&current),
            None => bail!("no round has been promoted yet"),
        },
        QueryCommand::Stats => print_json(&store.global_stats()?),
        QueryCommand::Donation { tx_hash, log_index } => {
            let id = DonationId {
                tx_hash: *tx_hash,
                log_index: *log_index,
            };
            match store.donation(id)? {
                Some(donation) => print_json(&donation),
                None => bail!("no donation with id {id}"),
            }
        },
        QueryCommand::User { address } => match store.user(*address)? {
            Some(user) => print_json(&user),
            None => bail!("no user with address {address}"),
        },
    }
}

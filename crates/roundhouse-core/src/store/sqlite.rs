//! `SQLite`-backed projection store.
//!
//! The durable, queryable output of a replay. Uses WAL mode so
//! downstream readers can query while a replay export is in progress.
//! 256-bit amounts are stored as decimal `TEXT` columns and re-parsed
//! on read; a failed parse surfaces as [`StoreError::Corrupt`].

// SQLite returns i64 for integer columns; all stored values fit u64.
#![allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use std::path::Path;
use std::str::FromStr;

use alloy_primitives::{Address, B256, I256, U256};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use super::{MemoryStore, StateStore, StoreError};
use crate::state::{
    AllocationKey, AllocationRecord, BalanceKey, BalanceKind, CurrentRound, Donation, DonationId,
    GlobalStats, Round, RoundId, User,
};

/// Projection schema. One table per entity; singletons are pinned to a
/// single row with a CHECK constraint.
const SCHEMA_SQL: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS users (
    address TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS donations (
    tx_hash TEXT NOT NULL,
    log_index INTEGER NOT NULL,
    user TEXT NOT NULL,
    token TEXT NOT NULL,
    amount TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    PRIMARY KEY (tx_hash, log_index)
);

CREATE TABLE IF NOT EXISTS rounds (
    id TEXT PRIMARY KEY,
    round_start INTEGER NOT NULL,
    round_end INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    metadata TEXT
);

CREATE TABLE IF NOT EXISTS current_round (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    round TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS balances (
    token TEXT NOT NULL,
    kind TEXT NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (token, kind)
);

CREATE TABLE IF NOT EXISTS allocations (
    user TEXT NOT NULL,
    token TEXT NOT NULL,
    round TEXT NOT NULL,
    amount TEXT NOT NULL,
    claimed_amount TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    claimed_at INTEGER,
    PRIMARY KEY (user, token, round)
);

CREATE TABLE IF NOT EXISTS global_stats (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    times_allocated INTEGER NOT NULL,
    times_claimed INTEGER NOT NULL
);
";

fn parse_address(s: &str) -> Result<Address, StoreError> {
    Address::from_str(s).map_err(|e| StoreError::Corrupt {
        entity: "address",
        details: e.to_string(),
    })
}

fn parse_hash(s: &str) -> Result<B256, StoreError> {
    B256::from_str(s).map_err(|e| StoreError::Corrupt {
        entity: "hash",
        details: e.to_string(),
    })
}

fn parse_signed(s: &str) -> Result<I256, StoreError> {
    I256::from_str(s).map_err(|e| StoreError::Corrupt {
        entity: "amount",
        details: e.to_string(),
    })
}

fn parse_unsigned(s: &str) -> Result<U256, StoreError> {
    U256::from_str(s).map_err(|e| StoreError::Corrupt {
        entity: "amount",
        details: e.to_string(),
    })
}

fn parse_kind(s: &str) -> Result<BalanceKind, StoreError> {
    BalanceKind::from_str(s).map_err(|e| StoreError::Corrupt {
        entity: "balance kind",
        details: e.to_string(),
    })
}

/// Durable [`StateStore`] backed by `SQLite`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates a projection database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory projection store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }

    /// Replaces the entire projection with the contents of a
    /// [`MemoryStore`], atomically.
    ///
    /// Used at the end of a replay to publish the final state.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; on error nothing is
    /// replaced.
    pub fn import(&mut self, state: &MemoryStore) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;

        for table in [
            "users",
            "donations",
            "rounds",
            "current_round",
            "balances",
            "allocations",
            "global_stats",
        ] {
            tx.execute(&format!("DELETE FROM {table}"), [])?;
        }

        for user in state.users() {
            tx.execute(
                "INSERT INTO users (address, created_at) VALUES (?1, ?2)",
                params![user.address.to_string(), user.created_at as i64],
            )?;
        }
        for donation in state.donations() {
            tx.execute(
                "INSERT INTO donations (tx_hash, log_index, user, token, amount, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    donation.id.tx_hash.to_string(),
                    donation.id.log_index as i64,
                    donation.user.to_string(),
                    donation.token.to_string(),
                    donation.amount.to_string(),
                    donation.timestamp as i64,
                ],
            )?;
        }
        for round in state.rounds() {
            tx.execute(
                "INSERT INTO rounds (id, round_start, round_end, created_at, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    round.id.to_string(),
                    round.start as i64,
                    round.end as i64,
                    round.created_at as i64,
                    round.metadata,
                ],
            )?;
        }
        if let Some(current) = state.current_round()? {
            tx.execute(
                "INSERT INTO current_round (slot, round, updated_at) VALUES (0, ?1, ?2)",
                params![current.round.to_string(), current.updated_at as i64],
            )?;
        }
        for balance in state.balances() {
            tx.execute(
                "INSERT INTO balances (token, kind, amount) VALUES (?1, ?2, ?3)",
                params![
                    balance.token.to_string(),
                    balance.kind.as_str(),
                    balance.amount.to_string(),
                ],
            )?;
        }
        for record in state.allocations() {
            tx.execute(
                "INSERT INTO allocations
                     (user, token, round, amount, claimed_amount, updated_at, claimed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.user.to_string(),
                    record.token.to_string(),
                    record.round.to_string(),
                    record.amount.to_string(),
                    record.claimed_amount.to_string(),
                    record.updated_at as i64,
                    record.claimed_at.map(|t| t as i64),
                ],
            )?;
        }
        let stats = state.global_stats()?;
        tx.execute(
            "INSERT INTO global_stats (slot, times_allocated, times_claimed) VALUES (0, ?1, ?2)",
            params![stats.times_allocated as i64, stats.times_claimed as i64],
        )?;

        tx.commit()?;
        Ok(())
    }
}

impl StateStore for SqliteStore {
    fn user(&self, address: Address) -> Result<Option<User>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT created_at FROM users WHERE address = ?1",
                params![address.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(row.map(|created_at| User {
            address,
            created_at: created_at as u64,
        }))
    }

    fn put_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO users (address, created_at) VALUES (?1, ?2)",
            params![user.address.to_string(), user.created_at as i64],
        )?;
        Ok(())
    }

    fn donation(&self, id: DonationId) -> Result<Option<Donation>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT user, token, amount, timestamp
                 FROM donations WHERE tx_hash = ?1 AND log_index = ?2",
                params![id.tx_hash.to_string(), id.log_index as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(user, token, amount, timestamp)| {
            Ok(Donation {
                id,
                user: parse_address(&user)?,
                token: parse_address(&token)?,
                amount: parse_unsigned(&amount)?,
                timestamp: timestamp as u64,
            })
        })
        .transpose()
    }

    fn put_donation(&mut self, donation: &Donation) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO donations (tx_hash, log_index, user, token, amount, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                donation.id.tx_hash.to_string(),
                donation.id.log_index as i64,
                donation.user.to_string(),
                donation.token.to_string(),
                donation.amount.to_string(),
                donation.timestamp as i64,
            ],
        )?;
        Ok(())
    }

    fn round(&self, id: RoundId) -> Result<Option<Round>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT round_start, round_end, created_at, metadata
                 FROM rounds WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(start, end, created_at, metadata)| Round {
            id,
            start: start as u64,
            end: end as u64,
            created_at: created_at as u64,
            metadata,
        }))
    }

    fn put_round(&mut self, round: &Round) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO rounds (id, round_start, round_end, created_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                round.id.to_string(),
                round.start as i64,
                round.end as i64,
                round.created_at as i64,
                round.metadata,
            ],
        )?;
        Ok(())
    }

    fn current_round(&self) -> Result<Option<CurrentRound>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT round, updated_at FROM current_round WHERE slot = 0",
                [],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        row.map(|(round, updated_at)| {
            Ok(CurrentRound {
                round: parse_hash(&round)?,
                updated_at: updated_at as u64,
            })
        })
        .transpose()
    }

    fn set_current_round(&mut self, current: &CurrentRound) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO current_round (slot, round, updated_at) VALUES (0, ?1, ?2)",
            params![current.round.to_string(), current.updated_at as i64],
        )?;
        Ok(())
    }

    fn balance(&self, key: BalanceKey) -> Result<I256, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT amount FROM balances WHERE token = ?1 AND kind = ?2",
                params![key.token.to_string(), key.kind.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        row.map_or(Ok(I256::ZERO), |amount| parse_signed(&amount))
    }

    fn put_balance(&mut self, key: BalanceKey, amount: I256) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO balances (token, kind, amount) VALUES (?1, ?2, ?3)",
            params![
                key.token.to_string(),
                key.kind.as_str(),
                amount.to_string()
            ],
        )?;
        Ok(())
    }

    fn allocation(&self, key: AllocationKey) -> Result<Option<AllocationRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT amount, claimed_amount, updated_at, claimed_at
                 FROM allocations WHERE user = ?1 AND token = ?2 AND round = ?3",
                params![
                    key.user.to_string(),
                    key.token.to_string(),
                    key.round.to_string()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(amount, claimed_amount, updated_at, claimed_at)| {
            Ok(AllocationRecord {
                user: key.user,
                token: key.token,
                round: key.round,
                amount: parse_signed(&amount)?,
                claimed_amount: parse_signed(&claimed_amount)?,
                updated_at: updated_at as u64,
                claimed_at: claimed_at.map(|t| t as u64),
            })
        })
        .transpose()
    }

    fn put_allocation(&mut self, record: &AllocationRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO allocations
                 (user, token, round, amount, claimed_amount, updated_at, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.user.to_string(),
                record.token.to_string(),
                record.round.to_string(),
                record.amount.to_string(),
                record.claimed_amount.to_string(),
                record.updated_at as i64,
                record.claimed_at.map(|t| t as i64),
            ],
        )?;
        Ok(())
    }

    fn delete_allocation(&mut self, key: AllocationKey) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM allocations WHERE user = ?1 AND token = ?2 AND round = ?3",
            params![
                key.user.to_string(),
                key.token.to_string(),
                key.round.to_string()
            ],
        )?;
        Ok(())
    }

    fn global_stats(&self) -> Result<GlobalStats, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT times_allocated, times_claimed FROM global_stats WHERE slot = 0",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        Ok(row.map_or_else(GlobalStats::default, |(allocated, claimed)| GlobalStats {
            times_allocated: allocated as u64,
            times_claimed: claimed as u64,
        }))
    }

    fn put_global_stats(&mut self, stats: &GlobalStats) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO global_stats (slot, times_allocated, times_claimed)
             VALUES (0, ?1, ?2)",
            params![stats.times_allocated as i64, stats.times_claimed as i64],
        )?;
        Ok(())
    }
}

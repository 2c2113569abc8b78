//! `SQLite`-backed append-only event journal.
//!
//! The journal is the local, totally-ordered copy of the decoded event
//! stream that replays feed from. Sequence ids are assigned on append
//! and define replay order; the feeder appends in chain order and the
//! journal enforces it, rejecting any envelope that does not strictly
//! increase the `(block_number, log_index)` position. A mis-ordered
//! feed is caught here, before it can corrupt every projection derived
//! downstream.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use thiserror::Error;

use crate::event::EventEnvelope;

/// Journal schema. The envelope is stored as JSON alongside indexed
/// ordering columns.
const SCHEMA_SQL: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS events (
    seq_id INTEGER PRIMARY KEY AUTOINCREMENT,
    block_number INTEGER NOT NULL,
    log_index INTEGER NOT NULL,
    block_timestamp INTEGER NOT NULL,
    tx_hash TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_position
    ON events(block_number, log_index);
";

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JournalError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope (de)serialization error.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Event not found.
    #[error("event not found: seq_id={seq_id}")]
    EventNotFound {
        /// The sequence ID that was not found.
        seq_id: u64,
    },

    /// An append would violate `(block, log)` monotonicity.
    #[error(
        "out-of-order append: ({block_number}, {log_index}) \
         does not follow journal head ({head_block}, {head_log})"
    )]
    OutOfOrder {
        /// Block number of the rejected envelope.
        block_number: u64,
        /// Log index of the rejected envelope.
        log_index: u64,
        /// Block number at the journal head.
        head_block: u64,
        /// Log index at the journal head.
        head_log: u64,
    },
}

/// An envelope together with its assigned journal position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Sequence ID assigned on append.
    pub seq_id: u64,
    /// The stored envelope.
    pub envelope: EventEnvelope,
}

/// Statistics about the journal.
#[derive(Debug, Clone, Default)]
pub struct JournalStats {
    /// Total number of events.
    pub event_count: u64,
    /// Highest sequence ID (0 if empty).
    pub max_seq_id: u64,
    /// Block number of the first stored event.
    pub first_block: Option<u64>,
    /// Block number of the last stored event.
    pub last_block: Option<u64>,
}

/// The append-only event journal backed by `SQLite`.
///
/// WAL mode allows concurrent reads while an ingest is in progress.
/// Events are never modified or deleted.
pub struct SqliteJournal {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJournal {
    /// Opens or creates a journal at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory journal for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, JournalError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Appends an envelope, enforcing the ordering contract.
    ///
    /// Returns the assigned sequence ID.
    ///
    /// # Errors
    ///
    /// Returns `OutOfOrder` if the envelope's `(block, log)` position
    /// does not strictly follow the journal head.
    pub fn append(&self, envelope: &EventEnvelope) -> Result<u64, JournalError> {
        let conn = self.conn.lock().unwrap();
        Self::append_inner(&conn, envelope)
    }

    /// Appends multiple envelopes in a single transaction.
    ///
    /// Returns the sequence IDs assigned in order. On error no envelope
    /// is appended.
    ///
    /// # Errors
    ///
    /// Returns the first ordering or database error encountered.
    pub fn append_batch(&self, envelopes: &[EventEnvelope]) -> Result<Vec<u64>, JournalError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut seq_ids = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            seq_ids.push(Self::append_inner(&tx, envelope)?);
        }
        tx.commit()?;
        Ok(seq_ids)
    }

    fn append_inner(conn: &Connection, envelope: &EventEnvelope) -> Result<u64, JournalError> {
        let head: Option<(i64, i64)> = conn
            .query_row(
                "SELECT block_number, log_index FROM events ORDER BY seq_id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((head_block, head_log)) = head {
            let head_key = (head_block as u64, head_log as u64);
            if envelope.order_key() <= head_key {
                return Err(JournalError::OutOfOrder {
                    block_number: envelope.block_number,
                    log_index: envelope.log_index,
                    head_block: head_key.0,
                    head_log: head_key.1,
                });
            }
        }

        let payload = serde_json::to_string(envelope)?;
        conn.execute(
            "INSERT INTO events (block_number, log_index, block_timestamp, tx_hash, kind, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                envelope.block_number as i64,
                envelope.log_index as i64,
                envelope.block_timestamp as i64,
                envelope.tx_hash.to_string(),
                envelope.event.kind(),
                payload,
            ],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Reads up to `limit` entries with sequence IDs >= `cursor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or envelope decoding fails.
    pub fn read_from(&self, cursor: u64, limit: u64) -> Result<Vec<JournalEntry>, JournalError> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT seq_id, payload FROM events
             WHERE seq_id >= ?1
             ORDER BY seq_id ASC
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![cursor as i64, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq_id, payload)| {
                Ok(JournalEntry {
                    seq_id: seq_id as u64,
                    envelope: serde_json::from_str(&payload)?,
                })
            })
            .collect()
    }

    /// Reads a single entry by sequence ID.
    ///
    /// # Errors
    ///
    /// Returns `EventNotFound` if no event exists with that sequence ID.
    pub fn read_one(&self, seq_id: u64) -> Result<JournalEntry, JournalError> {
        let conn = self.conn.lock().unwrap();

        let payload: String = conn
            .query_row(
                "SELECT payload FROM events WHERE seq_id = ?1",
                params![seq_id as i64],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => JournalError::EventNotFound { seq_id },
                other => JournalError::Database(other),
            })?;

        Ok(JournalEntry {
            seq_id,
            envelope: serde_json::from_str(&payload)?,
        })
    }

    /// Gets the current maximum sequence ID (head of the journal).
    ///
    /// Returns 0 if the journal is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn head(&self) -> Result<u64, JournalError> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> =
            conn.query_row("SELECT MAX(seq_id) FROM events", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0) as u64)
    }

    /// Gets statistics about the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be gathered.
    pub fn stats(&self) -> Result<JournalStats, JournalError> {
        let conn = self.conn.lock().unwrap();

        let event_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        let max_seq_id: Option<i64> =
            conn.query_row("SELECT MAX(seq_id) FROM events", [], |row| row.get(0))?;
        let blocks: Option<(i64, i64)> = conn
            .query_row(
                "SELECT MIN(block_number), MAX(block_number) FROM events",
                [],
                |row| {
                    let min: Option<i64> = row.get(0)?;
                    let max: Option<i64> = row.get(1)?;
                    Ok(min.zip(max))
                },
            )?;

        Ok(JournalStats {
            event_count: event_count as u64,
            max_seq_id: max_seq_id.unwrap_or(0) as u64,
            first_block: blocks.map(|(min, _)| min as u64),
            last_block: blocks.map(|(_, max)| max as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256, U256};

    use super::*;
    use crate::event::ChainEvent;

    fn envelope(block: u64, log: u64) -> EventEnvelope {
        EventEnvelope {
            block_number: block,
            block_timestamp: 1_000 + block,
            tx_hash: B256::repeat_byte(block as u8),
            log_index: log,
            event: ChainEvent::Withdraw {
                token: Address::repeat_byte(0xa1),
                amount: U256::from(1u64),
            },
        }
    }

    #[test]
    fn append_assigns_increasing_seq_ids() {
        let journal = SqliteJournal::in_memory().unwrap();
        assert_eq!(journal.append(&envelope(1, 0)).unwrap(), 1);
        assert_eq!(journal.append(&envelope(1, 1)).unwrap(), 2);
        assert_eq!(journal.append(&envelope(2, 0)).unwrap(), 3);
        assert_eq!(journal.head().unwrap(), 3);
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let journal = SqliteJournal::in_memory().unwrap();
        journal.append(&envelope(5, 3)).unwrap();

        // Earlier block.
        let err = journal.append(&envelope(4, 9)).unwrap_err();
        assert!(matches!(err, JournalError::OutOfOrder { .. }));
        // Same position.
        let err = journal.append(&envelope(5, 3)).unwrap_err();
        assert!(matches!(err, JournalError::OutOfOrder { .. }));
        // Earlier log in the same block.
        let err = journal.append(&envelope(5, 2)).unwrap_err();
        assert!(matches!(err, JournalError::OutOfOrder { .. }));

        assert_eq!(journal.head().unwrap(), 1);
    }

    #[test]
    fn append_batch_is_atomic() {
        let journal = SqliteJournal::in_memory().unwrap();
        // Second entry violates ordering, so nothing lands.
        let result = journal.append_batch(&[envelope(1, 0), envelope(1, 0)]);
        assert!(matches!(result, Err(JournalError::OutOfOrder { .. })));
        assert_eq!(journal.head().unwrap(), 0);

        let seq_ids = journal
            .append_batch(&[envelope(1, 0), envelope(1, 1), envelope(2, 0)])
            .unwrap();
        assert_eq!(seq_ids, vec![1, 2, 3]);
    }

    #[test]
    fn read_from_round_trips_envelopes() {
        let journal = SqliteJournal::in_memory().unwrap();
        let events = [envelope(1, 0), envelope(2, 0), envelope(3, 0)];
        journal.append_batch(&events).unwrap();

        let entries = journal.read_from(2, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq_id, 2);
        assert_eq!(entries[0].envelope, events[1]);
        assert_eq!(entries[1].envelope, events[2]);
    }

    #[test]
    fn read_one_reports_missing_events() {
        let journal = SqliteJournal::in_memory().unwrap();
        journal.append(&envelope(1, 0)).unwrap();

        assert_eq!(journal.read_one(1).unwrap().envelope, envelope(1, 0));
        assert!(matches!(
            journal.read_one(7),
            Err(JournalError::EventNotFound { seq_id: 7 })
        ));
    }

    #[test]
    fn stats_reflect_contents() {
        let journal = SqliteJournal::in_memory().unwrap();
        let empty = journal.stats().unwrap();
        assert_eq!(empty.event_count, 0);
        assert_eq!(empty.first_block, None);

        journal
            .append_batch(&[envelope(10, 0), envelope(20, 0)])
            .unwrap();
        let stats = journal.stats().unwrap();
        assert_eq!(stats.event_count, 2);
        assert_eq!(stats.max_seq_id, 2);
        assert_eq!(stats.first_block, Some(10));
        assert_eq!(stats.last_block, Some(20));
    }
}

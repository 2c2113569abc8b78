//! Checkpoint storage for projection state.
//!
//! A checkpoint pins a serialized projection snapshot to a journal
//! position, enabling incremental replay from that point instead of
//! from genesis.

// SQLite returns i64 for row IDs and counts, but they're always non-negative.
// Timestamps won't overflow u64 until the year 2554.
// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_possible_truncation,
    clippy::missing_panics_doc
)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OpenFlags, params};
use thiserror::Error;

/// Schema for checkpoint storage.
const SCHEMA_SQL: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;

CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    projector TEXT NOT NULL,
    seq_id INTEGER NOT NULL,
    state_json TEXT NOT NULL,
    created_at_ns INTEGER NOT NULL,
    UNIQUE(projector, seq_id)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_projector_seq
    ON checkpoints(projector, seq_id DESC);
";

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CheckpointStoreError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during database operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint not found.
    #[error("no checkpoint found for projector '{projector}'")]
    NotFound {
        /// The projector name that was not found.
        projector: String,
    },
}

/// A saved projection checkpoint.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Unique identifier for this checkpoint.
    pub id: Option<u64>,

    /// Name of the projector this checkpoint belongs to.
    pub projector: String,

    /// The journal sequence ID this checkpoint was taken at.
    pub seq_id: u64,

    /// Serialized projection state (JSON snapshot).
    pub state_json: String,

    /// Timestamp when the checkpoint was created.
    pub created_at_ns: u64,
}

impl Checkpoint {
    /// Creates a new checkpoint with the current timestamp.
    #[must_use]
    pub fn new(projector: impl Into<String>, seq_id: u64, state_json: String) -> Self {
        let created_at_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        Self {
            id: None,
            projector: projector.into(),
            seq_id,
            state_json,
            created_at_ns,
        }
    }
}

fn row_to_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        id: Some(row.get::<_, i64>(0)? as u64),
        projector: row.get(1)?,
        seq_id: row.get::<_, i64>(2)? as u64,
        state_json: row.get(3)?,
        created_at_ns: row.get::<_, i64>(4)? as u64,
    })
}

/// Storage for projection checkpoints.
pub struct CheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl CheckpointStore {
    /// Opens or creates a checkpoint store at the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointStoreError> {
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

    /// Creates an in-memory checkpoint store for testing or for runs
    /// that do not persist checkpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, CheckpointStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Saves a checkpoint, replacing any existing one at the same
    /// `(projector, seq_id)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be saved.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<u64, CheckpointStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO checkpoints (projector, seq_id, state_json, created_at_ns)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                checkpoint.projector,
                checkpoint.seq_id as i64,
                checkpoint.state_json,
                checkpoint.created_at_ns as i64,
            ],
        )?;
        Ok(conn.last_insert_rowid() as u64)
    }

    /// Loads the checkpoint with the highest `seq_id` for a projector.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no checkpoint exists for this projector.
    pub fn load_latest(&self, projector: &str) -> Result<Checkpoint, CheckpointStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, projector, seq_id, state_json, created_at_ns
             FROM checkpoints
             WHERE projector = ?1
             ORDER BY seq_id DESC
             LIMIT 1",
            params![projector],
            row_to_checkpoint,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CheckpointStoreError::NotFound {
                projector: projector.to_string(),
            },
            other => CheckpointStoreError::Database(other),
        })
    }

    /// Loads a checkpoint at a specific sequence ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no checkpoint exists at that position.
    pub fn load_at(
        &self,
        projector: &str,
        seq_id: u64,
    ) -> Result<Checkpoint, CheckpointStoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, projector, seq_id, state_json, created_at_ns
             FROM checkpoints
             WHERE projector = ?1 AND seq_id = ?2",
            params![projector, seq_id as i64],
            row_to_checkpoint,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => CheckpointStoreError::NotFound {
                projector: projector.to_string(),
            },
            other => CheckpointStoreError::Database(other),
        })
    }

    /// Lists all checkpoints for a projector, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, projector: &str) -> Result<Vec<Checkpoint>, CheckpointStoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, projector, seq_id, state_json, created_at_ns
             FROM checkpoints
             WHERE projector = ?1
             ORDER BY seq_id DESC",
        )?;
        let checkpoints = stmt
            .query_map(params![projector], row_to_checkpoint)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(checkpoints)
    }

    /// Deletes checkpoints strictly older than `keep_after_seq_id`.
    ///
    /// Returns the number of checkpoints deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub fn prune(
        &self,
        projector: &str,
        keep_after_seq_id: u64,
    ) -> Result<usize, CheckpointStoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM checkpoints WHERE projector = ?1 AND seq_id < ?2",
            params![projector, keep_after_seq_id as i64],
        )?;
        Ok(deleted)
    }

    /// Deletes all checkpoints for a projector.
    ///
    /// Returns the number of checkpoints deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails.
    pub fn delete_all(&self, projector: &str) -> Result<usize, CheckpointStoreError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM checkpoints WHERE projector = ?1",
            params![projector],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn save_and_load_latest() {
        let store = CheckpointStore::in_memory().unwrap();
        store
            .save(&Checkpoint::new("p", 10, "{\"a\":1}".to_string()))
            .unwrap();
        store
            .save(&Checkpoint::new("p", 20, "{\"a\":2}".to_string()))
            .unwrap();

        let latest = store.load_latest("p").unwrap();
        assert_eq!(latest.seq_id, 20);
        assert_eq!(latest.state_json, "{\"a\":2}");
    }

    #[test]
    fn load_latest_not_found() {
        let store = CheckpointStore::in_memory().unwrap();
        assert!(matches!(
            store.load_latest("missing"),
            Err(CheckpointStoreError::NotFound { .. })
        ));
    }

    #[test]
    fn replace_at_same_seq_id() {
        let store = CheckpointStore::in_memory().unwrap();
        store
            .save(&Checkpoint::new("p", 10, "old".to_string()))
            .unwrap();
        store
            .save(&Checkpoint::new("p", 10, "new".to_string()))
            .unwrap();

        let checkpoints = store.list("p").unwrap();
        assert_eq!(checkpoints.len(), 1);
        assert_eq!(checkpoints[0].state_json, "new");
    }

    #[test]
    fn prune_keeps_recent() {
        let store = CheckpointStore::in_memory().unwrap();
        for seq_id in [10, 20, 30] {
            store
                .save(&Checkpoint::new("p", seq_id, String::new()))
                .unwrap();
        }

        assert_eq!(store.prune("p", 25).unwrap(), 2);
        let remaining = store.list("p").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].seq_id, 30);
    }

    #[test]
    fn delete_all_clears_projector() {
        let store = CheckpointStore::in_memory().unwrap();
        store
            .save(&Checkpoint::new("p", 10, String::new()))
            .unwrap();
        store
            .save(&Checkpoint::new("q", 10, String::new()))
            .unwrap();

        assert_eq!(store.delete_all("p").unwrap(), 1);
        assert!(store.list("p").unwrap().is_empty());
        assert_eq!(store.list("q").unwrap().len(), 1);
    }
}

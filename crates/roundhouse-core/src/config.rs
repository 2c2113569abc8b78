//! Indexer configuration.
//!
//! Loaded from a TOML file; every field except the journal path has a
//! default, and validation is fail-closed: a config that would make the
//! indexer misbehave is rejected at load time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but describes an unusable setup.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Path to the journal database.
    pub journal_db: PathBuf,

    /// Path to the queryable `SQLite` projection. When unset, runs keep
    /// the projection in memory only.
    #[serde(default)]
    pub state_db: Option<PathBuf>,

    /// Path to the checkpoint database. When unset, checkpoints share
    /// the journal's directory under `checkpoints.db`.
    #[serde(default)]
    pub checkpoint_db: Option<PathBuf>,

    /// Save a checkpoint after this many applied events.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Journal entries read per batch during replay.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
}

const fn default_checkpoint_interval() -> u64 {
    1_000
}

const fn default_batch_size() -> u64 {
    256
}

impl IndexerConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or fails
    /// validation.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if any field would make the indexer
    /// misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.journal_db.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "journal_db must not be empty".to_string(),
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(ConfigError::Validation(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves the checkpoint database path: the configured one, or
    /// `checkpoints.db` next to the journal.
    #[must_use]
    pub fn checkpoint_db_path(&self) -> PathBuf {
        self.checkpoint_db.clone().unwrap_or_else(|| {
            self.journal_db
                .parent()
                .map_or_else(PathBuf::new, Path::to_path_buf)
                .join("checkpoints.db")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = IndexerConfig::from_toml(r#"journal_db = "journal.db""#).unwrap();
        assert_eq!(config.journal_db, PathBuf::from("journal.db"));
        assert_eq!(config.state_db, None);
        assert_eq!(config.checkpoint_interval, 1_000);
        assert_eq!(config.batch_size, 256);
    }

    #[test]
    fn full_config_round_trips() {
        let config = IndexerConfig::from_toml(
            r#"
            journal_db = "/data/journal.db"
            state_db = "/data/state.db"
            checkpoint_db = "/data/checkpoints.db"
            checkpoint_interval = 500
            batch_size = 64
            "#,
        )
        .unwrap();
        assert_eq!(config.state_db, Some(PathBuf::from("/data/state.db")));
        assert_eq!(config.checkpoint_interval, 500);
        assert_eq!(config.batch_size, 64);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        for bad in [
            "journal_db = \"j.db\"\ncheckpoint_interval = 0",
            "journal_db = \"j.db\"\nbatch_size = 0",
            "journal_db = \"\"",
        ] {
            assert!(matches!(
                IndexerConfig::from_toml(bad),
                Err(ConfigError::Validation(_))
            ));
        }
    }

    #[test]
    fn missing_journal_db_fails_parse() {
        assert!(matches!(
            IndexerConfig::from_toml("batch_size = 4"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn checkpoint_db_defaults_next_to_journal() {
        let config = IndexerConfig::from_toml(r#"journal_db = "/data/journal.db""#).unwrap();
        assert_eq!(
            config.checkpoint_db_path(),
            PathBuf::from("/data/checkpoints.db")
        );
    }
}

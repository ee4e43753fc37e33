//! Daemon configuration.
//!
//! Parsed from a TOML file. Every field has a default so an empty file
//! (or no file at all) yields a runnable memory-backed daemon.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::txn::DEFAULT_MAX_COMMIT_ATTEMPTS;
use crate::teardown::DEFAULT_BATCH_SIZE;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Request socket path.
    #[serde(default = "default_socket")]
    pub socket: PathBuf,

    /// Store backend selection.
    #[serde(default)]
    pub store: StoreConfig,

    /// Teardown sweep tuning.
    #[serde(default)]
    pub teardown: TeardownConfig,

    /// Commit retry tuning.
    #[serde(default)]
    pub commit: CommitConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            store: StoreConfig::default(),
            teardown: TeardownConfig::default(),
            commit: CommitConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a bound is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.teardown.batch_size == 0 {
            return Err(ConfigError::Validation(
                "teardown.batch_size must be at least 1".to_string(),
            ));
        }
        if self.commit.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "commit.max_attempts must be at least 1".to_string(),
            ));
        }
        if matches!(self.store.backend, StoreBackend::Sqlite) && self.store.path.is_none() {
            return Err(ConfigError::Validation(
                "store.path is required for the sqlite backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Which backend to run.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database path, required for [`StoreBackend::Sqlite`].
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Available store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process map. State dies with the daemon.
    #[default]
    Memory,
    /// `SQLite` file, WAL mode.
    Sqlite,
}

/// Teardown sweep tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeardownConfig {
    /// Bucket signups deleted per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Commit retry tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Bound on optimistic commit attempts per transaction.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
        }
    }
}

fn default_socket() -> PathBuf {
    PathBuf::from("/tmp/lineupd.sock")
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_COMMIT_ATTEMPTS
}

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or type error.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A bound or combination of fields is invalid.
    #[error("invalid config: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_defaults() {
        let config = DaemonConfig::from_toml("").unwrap();
        assert_eq!(config.socket, PathBuf::from("/tmp/lineupd.sock"));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.teardown.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.commit.max_attempts, DEFAULT_MAX_COMMIT_ATTEMPTS);
    }

    #[test]
    fn sqlite_backend_parses_with_path() {
        let config = DaemonConfig::from_toml(
            r#"
            socket = "/run/lineup/lineupd.sock"

            [store]
            backend = "sqlite"
            path = "/var/lib/lineup/lists.db"

            [teardown]
            batch_size = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(
            config.store.path.as_deref(),
            Some(Path::new("/var/lib/lineup/lists.db"))
        );
        assert_eq!(config.teardown.batch_size, 50);
    }

    #[test]
    fn sqlite_backend_requires_a_path() {
        let err = DaemonConfig::from_toml("[store]\nbackend = \"sqlite\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn zero_bounds_are_rejected() {
        assert!(DaemonConfig::from_toml("[teardown]\nbatch_size = 0").is_err());
        assert!(DaemonConfig::from_toml("[commit]\nmax_attempts = 0").is_err());
    }
}

//! Storage layout and identifier keyspace configuration.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ValidationError;

/// Storage configuration: data directory layout and the identifier
/// keyspace/locking parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for sessions, conversations, and the registry.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Identifier length drawn from the fixed alphabet.
    #[serde(default = "default_id_length")]
    pub id_length: usize,

    /// Bounded number of random draws per allocation.
    #[serde(default = "default_max_draws")]
    pub id_max_draws: u32,

    /// Registry lock retry budget.
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,

    /// Base backoff between lock attempts, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub lock_backoff_ms: u64,
}

impl StorageConfig {
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn conversations_dir(&self) -> PathBuf {
        self.data_dir.join("conversations")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("ids.txt")
    }

    pub fn lock_backoff(&self) -> Duration {
        Duration::from_millis(self.lock_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(4..=16).contains(&self.id_length) {
            return Err(ValidationError::invalid(
                "storage.id_length",
                "must be between 4 and 16",
            ));
        }
        if self.id_max_draws == 0 {
            return Err(ValidationError::invalid(
                "storage.id_max_draws",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            id_length: default_id_length(),
            id_max_draws: default_max_draws(),
            lock_retries: default_lock_retries(),
            lock_backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_id_length() -> usize {
    6
}

fn default_max_draws() -> u32 {
    16
}

fn default_lock_retries() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    25
}

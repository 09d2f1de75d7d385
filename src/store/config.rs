use super::Partitioning;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which storage backend to open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

/// Configuration for the timeseries store and entity registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file (shared by store and registry)
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Time partition width for history writes
    #[serde(default)]
    pub partitioning: Partitioning,

    /// How long SQLite waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_path() -> PathBuf {
    PathBuf::from("tskv.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_path(),
            partitioning: Partitioning::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

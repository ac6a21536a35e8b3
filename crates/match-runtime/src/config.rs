//! # Runtime Configuration
//!
//! Store selection and matching tunables, with environment overrides.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `TH_STORE` | `sqlite` | `sqlite` or `memory` |
//! | `TH_DATABASE_PATH` | `./data/matching.db` | SQLite file |
//! | `TH_BUSY_TIMEOUT_MS` | `5000` | SQLite lock wait |
//! | `TH_AUTO_MATCH` | `true` | Match new entries on creation |
//! | `TH_MAX_LISTED` | `500` | Cap on listings and previews |

use donation_matching::MatchingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Record store configuration.
    pub store: StoreConfig,
    /// Matching service configuration.
    pub matching: MatchingConfig,
}

/// Which record store backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Durable SQLite file.
    #[default]
    Sqlite,
    /// Process-lifetime in-memory tables.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend to open.
    pub backend: StoreBackend,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// How long a writer waits for the SQLite lock, in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_path: PathBuf::from("./data/matching.db"),
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    /// Busy timeout as a duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> RuntimeConfig {
    load_config_with(|key| std::env::var(key).ok())
}

/// Load configuration through `lookup`, starting from defaults.
///
/// Values that fail to parse are logged and ignored.
pub fn load_config_with(lookup: impl Fn(&str) -> Option<String>) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();

    override_from(&lookup, "TH_STORE", &mut config.store.backend);
    if let Some(path) = lookup("TH_DATABASE_PATH").filter(|p| !p.trim().is_empty()) {
        config.store.database_path = PathBuf::from(path);
    }
    override_from(&lookup, "TH_BUSY_TIMEOUT_MS", &mut config.store.busy_timeout_ms);
    override_from(
        &lookup,
        "TH_AUTO_MATCH",
        &mut config.matching.auto_match_on_create,
    );
    override_from(&lookup, "TH_MAX_LISTED", &mut config.matching.max_listed_entries);

    info!(
        "[runtime] Config: store={:?} path={:?} auto_match={} max_listed={}",
        config.store.backend,
        config.store.database_path,
        config.matching.auto_match_on_create,
        config.matching.max_listed_entries
    );
    config
}

fn override_from<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *slot = value,
        Err(e) => warn!("[runtime] Ignoring {}={:?}: {}", key, raw, e),
    }
}

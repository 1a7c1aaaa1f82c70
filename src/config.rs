//! Application-level configuration loading: game timings, role name and storage backend.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MAFIADON_CONFIG_PATH";
/// Environment variable selecting the storage backend.
const STORE_ENV: &str = "MAFIADON_STORE";
/// Environment variable overriding the SQLite database path.
const SQLITE_PATH_ENV: &str = "MAFIADON_SQLITE_PATH";

/// Which [`GameStore`](crate::dao::game_store::GameStore) backend to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Process-local tables; nothing survives a restart.
    Memory,
    /// SQLite file at [`AppConfig::sqlite_path`].
    Sqlite,
    /// CouchDB server configured through `COUCH_*` variables.
    Couchdb,
}

impl StoreKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            "couchdb" | "couch" => Some(Self::Couchdb),
            _ => None,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Name of the community role identifying players.
    pub role_name: String,
    /// Length of a hammer countdown.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "hammer_duration_secs")]
    pub hammer_duration: Duration,
    /// How often the countdown scheduler wakes up.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "tick_interval_secs")]
    pub tick_interval: Duration,
    /// Minimum spacing between two progress announcements of a running hammer.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "update_interval_secs")]
    pub update_interval: Duration,
    /// Capacity of the notification broadcast channel.
    pub notification_capacity: usize,
    /// Storage backend to connect at startup.
    pub store: StoreKind,
    /// Database file used by the SQLite backend.
    pub sqlite_path: PathBuf,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults,
    /// then apply environment overrides.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        role = %config.role_name,
                        hammer_secs = config.hammer_duration.as_secs(),
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };
        config.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = env::var(STORE_ENV) {
            match StoreKind::parse(&value) {
                Some(kind) => self.store = kind,
                None => warn!(value = %value, "unknown {STORE_ENV}; keeping {:?}", self.store),
            }
        }
        if let Some(path) = env::var_os(SQLITE_PATH_ENV).filter(|p| !p.is_empty()) {
            self.sqlite_path = PathBuf::from(path);
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            role_name: "i play mafia".into(),
            hammer_duration: Duration::from_secs(24 * 60 * 60),
            tick_interval: Duration::from_secs(60),
            update_interval: Duration::from_secs(4 * 60 * 60),
            notification_capacity: 64,
            store: StoreKind::Sqlite,
            sqlite_path: PathBuf::from("mafia_bot.db"),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let config: AppConfig =
            serde_json::from_str(r#"{"hammer_duration_secs": 3600, "store": "memory"}"#).unwrap();
        assert_eq!(config.hammer_duration, Duration::from_secs(3600));
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.role_name, "i play mafia");
        assert_eq!(config.tick_interval, Duration::from_secs(60));
    }

    #[test]
    fn store_kind_accepts_aliases() {
        assert_eq!(StoreKind::parse(" SQLite "), Some(StoreKind::Sqlite));
        assert_eq!(StoreKind::parse("couch"), Some(StoreKind::Couchdb));
        assert_eq!(StoreKind::parse("mongo"), None);
    }
}

//! Application-level configuration loading: storage location, timings, point values and the
//! player directory.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::state::session::PlayerId;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRAINING_BRACKET_CONFIG_PATH";
/// Default location of the persisted sessions document.
const DEFAULT_DATA_PATH: &str = "data/sessions.json";

/// Points credited at close-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    /// Credited to each member of the champion team.
    pub win: u32,
    /// Credited to each highlighted player.
    pub highlight: u32,
    /// Credited to the MVP.
    pub mvp: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            win: 3,
            highlight: 1,
            mvp: 2,
        }
    }
}

/// One entry of the static player directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerEntry {
    pub id: PlayerId,
    pub name: String,
    #[serde(default)]
    pub captain: bool,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// JSON document holding persisted sessions.
    pub data_path: PathBuf,
    /// Quiet period before a session snapshot is broadcast.
    #[serde(rename = "refresh_debounce_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub refresh_debounce: Duration,
    /// Age after which sessions without participants are evicted.
    #[serde(rename = "empty_session_ttl_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub empty_session_ttl: Duration,
    /// Age after which sessions that are not being played are evicted.
    #[serde(rename = "stale_session_ttl_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stale_session_ttl: Duration,
    /// Period of the eviction sweep.
    #[serde(rename = "cleanup_interval_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cleanup_interval: Duration,
    /// Lifetime of cached display names.
    #[serde(rename = "name_cache_ttl_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub name_cache_ttl: Duration,
    pub scoring: ScoringRules,
    /// Static directory backing display names and captain flags.
    pub players: Vec<PlayerEntry>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        Self::load_from(&resolve_config_path())
    }

    /// Load the configuration at `path`, falling back to defaults when it is missing or invalid.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        players = config.players.len(),
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
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            refresh_debounce: Duration::from_millis(300),
            empty_session_ttl: Duration::from_secs(30 * 60),
            stale_session_ttl: Duration::from_secs(12 * 60 * 60),
            cleanup_interval: Duration::from_secs(60),
            name_cache_ttl: Duration::from_secs(5 * 60),
            scoring: ScoringRules::default(),
            players: Vec::new(),
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

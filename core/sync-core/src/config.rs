//! Configuration loading.
//!
//! Reads `~/.bookmark-sync/config.toml` by default. A missing file yields
//! defaults; every section and field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bookmark_sync_protocol::DEFAULT_COLLECTION;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

const CONFIG_DIR: &str = ".bookmark-sync";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default)]
    pub sync: CollectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub bulk_load: BulkLoadConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionConfig {
    pub collection: String,
    pub channel_name: String,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            channel_name: "realtime bookmarks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub provider: String,
    pub origin: String,
    pub redirect_path: String,
    pub check_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            origin: "http://localhost:3000".to_string(),
            redirect_path: "/auth/callback".to_string(),
            check_timeout_ms: 5_000,
        }
    }
}

impl SessionConfig {
    pub fn redirect_url(&self) -> String {
        format!(
            "{}/{}",
            self.origin.trim_end_matches('/'),
            self.redirect_path.trim_start_matches('/')
        )
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BulkLoadConfig {
    pub max_attempts: u32,
    pub retry_step_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for BulkLoadConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            retry_step_ms: 250,
            retry_max_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Deleted ids stay deleted for the session lifetime.
    #[default]
    Tombstone,
    /// No tombstones; a later creation for a deleted id re-inserts it.
    LastEventWins,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub delete_policy: DeletePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedConfig {
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(SyncError::HomeDirNotFound)?;
    Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Loads configuration from `path`, or from the default location when `None`.
///
/// A missing default file yields defaults; a missing explicit path is a
/// `ConfigRead` error.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = default_config_path()?;
            if !default_path.exists() {
                return Ok(SyncConfig::default());
            }
            default_path
        }
    };

    let content = fs_err::read_to_string(&config_path).map_err(|source| SyncError::ConfigRead {
        path: config_path.clone(),
        source,
    })?;
    parse_config(&content).map_err(|details| SyncError::ConfigMalformed {
        path: config_path,
        details,
    })
}

pub fn parse_config(content: &str) -> std::result::Result<SyncConfig, String> {
    let config = toml::from_str::<SyncConfig>(content).map_err(|err| err.to_string())?;
    if config.sync.collection.trim().is_empty() {
        return Err("sync.collection must not be empty".to_string());
    }
    if config.feed.channel_capacity == 0 {
        return Err("feed.channel_capacity must be at least 1".to_string());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = parse_config("").expect("parse");
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.sync.collection, "bookmarks");
        assert_eq!(config.store.delete_policy, DeletePolicy::Tombstone);
    }

    #[test]
    fn missing_explicit_path_is_read_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("absent.toml");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, SyncError::ConfigRead { path: ref p, .. } if *p == path));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[store]\ndelete_policy = \"last_event_wins\"\n\n[bulk_load]\nmax_attempts = 5\n",
        )
        .expect("write config");

        let config = load_config(Some(&path)).expect("load");
        assert_eq!(config.store.delete_policy, DeletePolicy::LastEventWins);
        assert_eq!(config.bulk_load.max_attempts, 5);
        assert_eq!(config.bulk_load.retry_step_ms, 250);
        assert_eq!(config.session.provider, "google");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[store\n").expect("write config");

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, SyncError::ConfigMalformed { .. }));
    }

    #[test]
    fn rejects_zero_channel_capacity() {
        assert!(parse_config("[feed]\nchannel_capacity = 0\n").is_err());
    }

    #[test]
    fn redirect_url_joins_origin_and_path() {
        let session = SessionConfig {
            origin: "https://bookmarks.example/".to_string(),
            ..SessionConfig::default()
        };
        assert_eq!(
            session.redirect_url(),
            "https://bookmarks.example/auth/callback"
        );
    }
}

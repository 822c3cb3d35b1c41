//! Configuration Management
//!
//! Handles persistent configuration storage for infrakit. Every field is
//! optional; effective values resolve CLI > environment > file > default.

use crate::store::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment override for the snapshot directory
pub const CACHE_DIR_ENV: &str = "INFRAKIT_CACHE_DIR";

pub const DEFAULT_SERVE_ADDR: &str = "127.0.0.1:8080";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Directory holding cache.json
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Listen address of `infrakit serve`
    #[serde(default)]
    pub serve_addr: Option<String>,
    /// Region passed to the aws CLI
    #[serde(default)]
    pub aws_region: Option<String>,
    /// Skip organization discovery and walk this organization
    #[serde(default)]
    pub gcp_organization: Option<String>,
    #[serde(default)]
    pub concurrent_fetch: bool,
    #[serde(default)]
    pub keep_going: bool,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("infrakit").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load from an explicit path; a missing or unreadable file is the default
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Get effective cache directory (CLI > env > config > ~/.infrakit)
    pub fn effective_cache_dir(&self, cli: Option<&Path>) -> PathBuf {
        let env = std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from);
        self.resolve_cache_dir(cli, env)
    }

    fn resolve_cache_dir(&self, cli: Option<&Path>, env: Option<PathBuf>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or(env.filter(|p| !p.as_os_str().is_empty()))
            .or_else(|| self.cache_dir.clone())
            .unwrap_or_else(default_cache_dir)
    }

    /// Get effective listen address (CLI > config > 127.0.0.1:8080)
    pub fn effective_serve_addr(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.serve_addr.clone())
            .unwrap_or_else(|| DEFAULT_SERVE_ADDR.to_string())
    }

    /// Store rooted at the effective cache directory
    pub fn snapshot_store(&self, cli: Option<&Path>) -> SnapshotStore {
        SnapshotStore::new(self.effective_cache_dir(cli))
    }
}

fn default_cache_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".infrakit"),
        None => PathBuf::from(".infrakit"),
    }
}

//! Ambient configuration: backend selection, cache sizing, lease and
//! request timeouts, loadable from a JSON file on disk or from environment
//! variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no home directory available to derive a default config path")]
    NoHomeDir,
}

/// Which storage backend a [`RepositoryConfig`] addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Local { root: PathBuf },
    Http { base_url: String },
    ObjectStore { base_url: String, bucket: String },
}

/// Top-level configuration for a [`crate::repository::Repository`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub backend: BackendConfig,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_cache_capacity() -> usize {
    256
}

fn default_lease_ttl_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl RepositoryConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            cache_capacity: default_cache_capacity(),
            lease_ttl_secs: default_lease_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    /// Loads configuration from a JSON file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Writes this configuration to disk as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let rendered = serde_json::to_string_pretty(self)?;
        std::fs::write(path, rendered).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The conventional per-user config path: `~/.nebula-repository/config.json`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".nebula-repository").join("config.json"))
    }

    /// Loads from `NEBULA_REPOSITORY_CONFIG` if set, else from
    /// [`Self::default_path`], falling back to a local-filesystem default
    /// rooted at `~/.nebula-repository/store` when no file exists yet.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("NEBULA_REPOSITORY_CONFIG") {
            return Self::from_file(path);
        }
        let default_path = Self::default_path()?;
        if default_path.exists() {
            return Self::from_file(default_path);
        }
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(Self::new(BackendConfig::Local {
            root: home.join(".nebula-repository").join("store"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = RepositoryConfig::new(BackendConfig::Local {
            root: dir.path().join("store"),
        });
        config.save(&path).unwrap();
        let loaded = RepositoryConfig::from_file(&path).unwrap();
        assert_eq!(loaded.cache_capacity, config.cache_capacity);
        assert_eq!(loaded.lease_ttl_secs, config.lease_ttl_secs);
    }

    #[test]
    fn defaults_fill_in_when_absent() {
        let json = r#"{"backend": {"kind": "local", "root": "/tmp/x"}}"#;
        let config: RepositoryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.lease_ttl_secs, 60);
    }
}

//! Client configuration loaded from `config.toml`.
//!
//! Every field has a default, so an absent file or an empty table is a valid
//! configuration.
//!
//! ```toml
//! app_id = 480
//! control_url = "https://content.example.com/api"
//!
//! [pool]
//! capacity = 8
//! accepted_kinds = ["cdn", "cache"]
//!
//! [retry]
//! max_attempts = 8
//! initial_backoff_ms = 250
//! max_backoff_ms = 10000
//! ```

use crate::net::endpoint::ServerKind;
use crate::net::retry::RetryPolicy;
use depot_schema::AppId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of CDN endpoints kept in the pool.
    pub capacity: usize,
    /// Server kinds the pool accepts from discovery.
    pub accepted_kinds: Vec<ServerKind>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 8,
            accepted_kinds: vec![ServerKind::Cdn, ServerKind::Cache],
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Application whose depots are installed.
    pub app_id: AppId,
    /// Base URL of the control plane (auth, depot listing, discovery).
    pub control_url: String,
    /// Per-request timeout for HTTP transports.
    pub request_timeout_secs: u64,
    /// How long a manifest request code stays valid.
    pub manifest_code_ttl_secs: u64,
    /// Connection pool settings.
    pub pool: PoolConfig,
    /// Retry policy for manifest and chunk fetches.
    pub retry: RetryPolicy,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            app_id: 0,
            control_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
            manifest_code_ttl_secs: 300,
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DepotConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the text is not a valid configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Manifest request code lifetime.
    pub fn manifest_code_ttl(&self) -> Duration {
        Duration::from_secs(self.manifest_code_ttl_secs)
    }
}

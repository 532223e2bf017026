//! # Node Configuration
//!
//! Optional TOML file read by `veritas-node run`. Every field has a default,
//! so an empty file (or no file at all) yields a working node. Values given
//! on the command line or through `VERITAS_*` environment variables win
//! over the file.
//!
//! ```toml
//! api_port = 3322
//! metrics_port = 9497
//! signing_key_path = "/etc/veritas/signing.key"
//! database_name = "defaultdb"
//! log_format = "json"
//!
//! [session]
//! idle_timeout = 60
//! dead_timeout = 120
//! eviction_interval = 5
//! max_sessions = 1024
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use veritas_core::config::DEFAULT_DATABASE;
use veritas_core::SessionConfig;

/// Default port for the session/verification API.
pub const DEFAULT_API_PORT: u16 = 3322;

/// Default port for the Prometheus endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9497;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub api_port: u16,
    pub metrics_port: u16,
    /// Ed25519 key used to sign served states. Unsigned states when absent.
    pub signing_key_path: Option<PathBuf>,
    pub database_name: String,
    /// `pretty` or `json`.
    pub log_format: String,
    pub session: SessionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_port: DEFAULT_API_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            signing_key_path: None,
            database_name: DEFAULT_DATABASE.to_string(),
            log_format: "pretty".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse a TOML document and validate the session section.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(raw).context("malformed node configuration")?;
        config
            .session
            .validate()
            .context("invalid [session] configuration")?;
        Ok(config)
    }

    /// Read the config file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// `load(path)` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}

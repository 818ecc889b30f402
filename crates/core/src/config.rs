//! Relay configuration
//!
//! Loaded from a TOML file when one exists, otherwise built from defaults.
//! Lookup order: `$HUDDLE_CONFIG`, then `huddle.toml` in the platform config
//! directory. Every field is optional in the file.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable that points at an explicit config file
pub const CONFIG_ENV: &str = "HUDDLE_CONFIG";

/// Default TCP port
pub const DEFAULT_PORT: u16 = 8000;

/// Largest file the relay will forward (100 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Upper bound for a single read or write of file body bytes
pub const MAX_CHUNK_SIZE: usize = 8192;

/// Relay server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address to bind the listener on
    pub host: IpAddr,
    /// Port to bind the listener on (0 picks an ephemeral port)
    pub port: u16,
    /// Directory that receives one chat log per server run
    pub log_dir: PathBuf,
    /// Announced file sizes above this are drained and dropped
    pub max_file_size: u64,
    /// Bytes per file body read/write
    pub chunk_size: usize,
    /// Bytes accepted for the nickname reply
    pub nickname_read_limit: usize,
    /// Per-chunk send timeout while forwarding a file body
    pub file_chunk_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            log_dir: PathBuf::from("logs"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_size: MAX_CHUNK_SIZE,
            nickname_read_limit: 1024,
            file_chunk_timeout_secs: 10,
        }
    }
}

impl RelayConfig {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Load from `$HUDDLE_CONFIG` or the platform config dir, falling back to defaults
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            tracing::info!(path = ?path, "Loading config from environment override");
            return Self::from_file(PathBuf::from(path));
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::info!(path = %path.display(), "Loading config");
                Self::from_file(path)
            }
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Platform config location, e.g. `~/.config/huddle/huddle.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "onyx", "huddle").map(|dirs| dirs.config_dir().join("huddle.toml"))
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "chunk_size must be between 1 and {} (got {})",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if self.max_file_size == 0 {
            return Err(Error::Config("max_file_size must be positive".into()));
        }
        if self.nickname_read_limit == 0 {
            return Err(Error::Config("nickname_read_limit must be positive".into()));
        }
        if self.file_chunk_timeout_secs == 0 {
            return Err(Error::Config(
                "file_chunk_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn file_chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.file_chunk_timeout_secs)
    }
}

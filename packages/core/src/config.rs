//! Runtime configuration
//!
//! [`ServerConfig`] is rebuilt from the environment on every launch of the
//! sync server. [`SyncConfig`] holds client preferences; every field has a
//! serde default so older or partial preference files keep loading.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const DB_PATH_ENV: &str = "OUTLINE_DB_PATH";
pub const PORT_ENV: &str = "OUTLINE_SERVER_PORT";
pub const BIND_ADDR_ENV: &str = "OUTLINE_BIND_ADDR";

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";

/// Sync server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Resolved path to the SQLite database file
    pub database_path: PathBuf,

    /// HTTP port (from OUTLINE_SERVER_PORT or default 3001)
    pub port: u16,

    pub bind_address: IpAddr,
}

impl ServerConfig {
    /// Build the configuration from `OUTLINE_*` environment variables
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let database_path = match lookup(DB_PATH_ENV) {
            Some(path) => {
                tracing::info!("Using database path from {}: {}", DB_PATH_ENV, path);
                PathBuf::from(path)
            }
            None => default_database_path()?,
        };

        let port = match lookup(PORT_ENV) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| format!("Invalid {} '{}': {}", PORT_ENV, raw, e))?,
            None => DEFAULT_PORT,
        };

        let bind_address = lookup(BIND_ADDR_ENV)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_address = bind_address
            .parse::<IpAddr>()
            .map_err(|e| format!("Invalid {} '{}': {}", BIND_ADDR_ENV, bind_address, e))?;

        Ok(Self {
            database_path,
            port,
            bind_address,
        })
    }

    pub fn socket_address(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.bind_address, self.port)
    }
}

/// `~/.outline/outline.db`
pub fn default_database_path() -> Result<PathBuf, String> {
    let home_dir = dirs::home_dir().ok_or_else(|| "Failed to get home directory".to_string())?;
    Ok(home_dir.join(".outline").join("outline.db"))
}

/// Client-side sync preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Quiet period after the last edit before the idle saver fires
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Upper bound for one sync request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            base_url: default_base_url(),
        }
    }
}

fn default_idle_timeout_ms() -> u64 {
    1500
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_base_url() -> String {
    format!("http://{}:{}", DEFAULT_BIND_ADDR, DEFAULT_PORT)
}

impl SyncConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Load preferences from a JSON file; a missing file yields the defaults
    pub async fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read sync preferences: {}", e))?;

        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse sync preferences: {}", e))
    }
}

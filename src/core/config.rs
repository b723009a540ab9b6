//! Configuration management for the Concord document engine
//!
//! This module handles all configuration settings with sensible defaults
//! for real-time collaborative workloads. Settings load from an optional
//! TOML file, then `CONCORD_*` environment overrides, then validation.

use crate::core::error::{Error, Result};
use crate::core::fractional::{Charset, BASE62};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Per-document engine tuning
    pub document: DocumentConfig,

    /// Fractional index configuration
    pub fractional: FractionalConfig,

    /// Presence channel configuration
    pub presence: PresenceConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP/WebSocket bind address
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections
    pub max_connections: usize,

    /// Ping interval in seconds (liveness probes to idle clients)
    pub ping_interval_secs: u64,

    /// Connection considered dead after this many seconds without traffic
    pub connection_timeout_secs: u64,

    /// Per-connection outbound message buffer; slow consumers past this
    /// bound are disconnected
    pub outbound_buffer: usize,

    /// Number of worker threads (0 = auto-detect)
    pub worker_threads: usize,
}

/// Per-document engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Capacity of the recently-seen transaction id set
    pub seen_transactions: usize,

    /// Per-submit apply-time budget in milliseconds
    pub apply_budget_ms: u64,

    /// Broadcast channel capacity per document
    pub broadcast_buffer: usize,

    /// Evict idle documents with no subscribers after this many seconds
    pub evict_after_secs: u64,

    /// Periodic snapshot interval in seconds (0 disables)
    pub snapshot_interval_secs: u64,
}

impl DocumentConfig {
    /// Apply-time budget as a [`Duration`]
    pub fn apply_budget(&self) -> Duration {
        Duration::from_millis(self.apply_budget_ms)
    }
}

/// Fractional index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FractionalConfig {
    /// Ordered character set used for position keys
    pub charset: String,

    /// Neutral character starting the positive head range
    pub neutral: char,

    /// Jitter amplitude for conflict-avoiding key generation (0 disables)
    pub jitter: u64,
}

/// Presence channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Whether the ephemeral presence channel is enabled
    pub enabled: bool,

    /// Presence event broadcast capacity per document
    pub broadcast_buffer: usize,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend: "memory" or "file"
    pub backend: String,

    /// Data directory for the file backend
    pub data_dir: PathBuf,

    /// Whether the write-ahead log is enabled
    pub wal_enabled: bool,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Auth mode: "disabled" grants write to everyone, "static" uses the
    /// token table below
    pub mode: String,

    /// Static token table: token -> grant
    pub tokens: HashMap<String, StaticGrant>,
}

/// One static token grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticGrant {
    /// User id reported to clients
    pub user_id: String,

    /// Permission: "read" or "write"
    pub permission: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().expect("static addr"),
            max_connections: 10_000,
            ping_interval_secs: 20,
            connection_timeout_secs: 60,
            outbound_buffer: 256,
            worker_threads: 0, // Auto-detect
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            seen_transactions: 4096,
            apply_budget_ms: 250,
            broadcast_buffer: 512,
            evict_after_secs: 300,
            snapshot_interval_secs: 30,
        }
    }
}

impl Default for FractionalConfig {
    fn default() -> Self {
        Self {
            charset: BASE62.to_string(),
            neutral: 'a',
            jitter: 0,
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broadcast_buffer: 256,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            data_dir: PathBuf::from("./data"),
            wal_enabled: false,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: "disabled".to_string(),
            tokens: HashMap::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional file path plus environment
    /// variable overrides, falling back to defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Config::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        use std::env;

        if let Ok(addr) = env::var("CONCORD_BIND_ADDR") {
            self.server.bind_addr = addr
                .parse()
                .map_err(|e| Error::config(format!("Invalid bind address: {}", e)))?;
        }

        if let Ok(max_conn) = env::var("CONCORD_MAX_CONNECTIONS") {
            self.server.max_connections = max_conn
                .parse()
                .map_err(|e| Error::config(format!("Invalid max connections: {}", e)))?;
        }

        if let Ok(data_dir) = env::var("CONCORD_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(backend) = env::var("CONCORD_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }

        if let Ok(level) = env::var("CONCORD_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("CONCORD_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(Error::config("max_connections must be positive"));
        }

        if self.server.outbound_buffer == 0 || self.document.broadcast_buffer == 0 {
            return Err(Error::config("channel buffers must be positive"));
        }

        if self.document.seen_transactions == 0 {
            return Err(Error::config("seen_transactions must be positive"));
        }

        // Charset preconditions are enforced at construction; surface them
        // here so a bad config fails at startup, not on first insert.
        Charset::new(&self.fractional.charset, self.fractional.neutral)
            .map_err(|e| Error::config(e.to_string()))?;

        match self.storage.backend.as_str() {
            "memory" | "file" => {}
            other => {
                return Err(Error::config(format!("Unknown storage backend '{}'", other)));
            }
        }

        match self.auth.mode.as_str() {
            "disabled" | "static" => {}
            other => return Err(Error::config(format!("Unknown auth mode '{}'", other))),
        }

        for (token, grant) in &self.auth.tokens {
            if !matches!(grant.permission.as_str(), "read" | "write") {
                return Err(Error::config(format!(
                    "Invalid permission '{}' for token '{}'",
                    grant.permission, token
                )));
            }
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        Ok(())
    }

    /// Build the configured fractional charset
    pub fn charset(&self) -> Charset {
        Charset::new(&self.fractional.charset, self.fractional.neutral)
            .expect("charset validated at load time")
    }

    /// Ping interval as a [`Duration`]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.server.ping_interval_secs)
    }

    /// Connection timeout as a [`Duration`]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.server.connection_timeout_secs)
    }

    /// Apply-time budget as a [`Duration`]
    pub fn apply_budget(&self) -> Duration {
        Duration::from_millis(self.document.apply_budget_ms)
    }

    /// Idle eviction threshold as a [`Duration`]
    pub fn evict_after(&self) -> Duration {
        Duration::from_secs(self.document.evict_after_secs)
    }

    /// Get optimal number of worker threads
    pub fn optimal_worker_threads(&self) -> usize {
        if self.server.worker_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.server.worker_threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.charset().initial_key(), "a0");
    }

    #[test]
    fn test_bad_charset_rejected_at_load() {
        let mut config = Config::default();
        config.fractional.charset = "abc".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = Config::default();
        config.storage.backend = "s3".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.server.bind_addr, config.server.bind_addr);
        assert_eq!(parsed.fractional.charset, config.fractional.charset);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: Config = toml::from_str("[server]\nmax_connections = 7\n").unwrap();
        assert_eq!(parsed.server.max_connections, 7);
        assert_eq!(parsed.document.seen_transactions, 4096);
    }

    #[test]
    fn test_static_auth_permissions_validated() {
        let mut config = Config::default();
        config.auth.mode = "static".to_string();
        config.auth.tokens.insert(
            "t1".to_string(),
            StaticGrant { user_id: "u1".to_string(), permission: "admin".to_string() },
        );
        assert!(config.validate().is_err());
    }
}

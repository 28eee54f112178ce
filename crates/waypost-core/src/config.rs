//! Configuration system for waypost.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. explicit path (`waypostd --config <path>`)
//!   2. $WAYPOST_CONFIG
//!   3. $XDG_CONFIG_HOME/waypost/config.toml
//!   4. ~/.config/waypost/config.toml
//!
//! A missing file is not an error; defaults apply.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaypostConfig {
    pub network: NetworkConfig,
    pub liveness: LivenessConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// `<addr>:<port>` for producer (peer protocol) connections.
    pub tcp_address: String,
    /// `<addr>:<port>` for the HTTP query API.
    pub http_address: String,
    /// Address this node advertises. Empty = OS hostname.
    pub broadcast_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// A producer is evicted once it has been silent this long.
    pub inactive_producer_timeout_secs: u64,
    /// A tombstoned producer is purged after this long.
    pub tombstone_lifetime_secs: u64,
    /// Sweeper tick. 0 = derived from the two durations above.
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset: trace, debug, info, warn, error.
    pub level: String,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tcp_address: "0.0.0.0:4160".to_string(),
            http_address: "0.0.0.0:4161".to_string(),
            broadcast_address: String::new(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            inactive_producer_timeout_secs: 300,
            tombstone_lifetime_secs: 45,
            sweep_interval_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ── Derived values ────────────────────────────────────────────────────────────

/// Floor for a derived sweep interval.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

impl LivenessConfig {
    pub fn inactive_producer_timeout(&self) -> Duration {
        Duration::from_secs(self.inactive_producer_timeout_secs)
    }

    pub fn tombstone_lifetime(&self) -> Duration {
        Duration::from_secs(self.tombstone_lifetime_secs)
    }

    /// Explicit interval if set, else [`derive_sweep_interval`].
    pub fn sweep_interval(&self) -> Duration {
        if self.sweep_interval_ms > 0 {
            return Duration::from_millis(self.sweep_interval_ms);
        }
        derive_sweep_interval(self.inactive_producer_timeout(), self.tombstone_lifetime())
    }
}

/// A tenth of the shorter duration, never below [`MIN_SWEEP_INTERVAL`].
pub fn derive_sweep_interval(inactive_timeout: Duration, tombstone_lifetime: Duration) -> Duration {
    (inactive_timeout.min(tombstone_lifetime) / 10).max(MIN_SWEEP_INTERVAL)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("waypost")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl WaypostConfig {
    /// Load config from the default location: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load config from `path`, then apply env overrides and validate.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            WaypostConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("WAYPOST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Well-formedness only: addresses parse, durations are non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_addr("network.tcp_address", &self.network.tcp_address)?;
        parse_addr("network.http_address", &self.network.http_address)?;
        if self.liveness.inactive_producer_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "liveness.inactive_producer_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.liveness.tombstone_lifetime_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "liveness.tombstone_lifetime_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("network.tcp_address", &self.network.tcp_address)
    }

    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("network.http_address", &self.network.http_address)
    }

    /// Apply WAYPOST_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("WAYPOST_NETWORK__TCP_ADDRESS") {
            self.network.tcp_address = v;
        }
        if let Some(v) = lookup("WAYPOST_NETWORK__HTTP_ADDRESS") {
            self.network.http_address = v;
        }
        if let Some(v) = lookup("WAYPOST_NETWORK__BROADCAST_ADDRESS") {
            self.network.broadcast_address = v;
        }
        if let Some(v) = lookup("WAYPOST_LIVENESS__INACTIVE_PRODUCER_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.liveness.inactive_producer_timeout_secs = secs;
            }
        }
        if let Some(v) = lookup("WAYPOST_LIVENESS__TOMBSTONE_LIFETIME_SECS") {
            if let Ok(secs) = v.parse() {
                self.liveness.tombstone_lifetime_secs = secs;
            }
        }
        if let Some(v) = lookup("WAYPOST_LOGGING__LEVEL") {
            self.logging.level = v;
        }
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
        field,
        reason: format!("'{value}': {e}"),
    })
}

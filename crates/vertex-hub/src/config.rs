//! # Hub Configuration
//!
//! Configuration for the sync hub and its listener.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     VERTEX_BIND_ADDR=0.0.0.0                                           │
//! │     VERTEX_PORT=9440                                                   │
//! │     VERTEX_SEND_TIMEOUT_MS=5000                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/vertex-erp/hub.toml (Linux)                              │
//! │     ~/Library/Application Support/com.vertex.vertex-erp/hub.toml (mac) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # hub.toml
//! [server]
//! bind_addr = "0.0.0.0"
//! port = 9440
//!
//! [sync]
//! send_timeout_ms = 5000
//! fanout_limit = 32
//! outbound_capacity = 64
//! applier_capacity = 256
//! hello_deadline_secs = 10
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{HubError, HubResult};

// =============================================================================
// Defaults
// =============================================================================

/// Default listener port for store connections.
pub const DEFAULT_PORT: u16 = 9440;

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_fanout_limit() -> usize {
    32
}

fn default_outbound_capacity() -> usize {
    64
}

fn default_applier_capacity() -> usize {
    256
}

fn default_hello_deadline_secs() -> u64 {
    10
}

// =============================================================================
// Settings
// =============================================================================

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address for the store-facing listener.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Listener port. Port 0 asks the OS for an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Bound on a single envelope send; a breach evicts the connection.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Upper bound on concurrent in-flight sends within one dispatch.
    #[serde(default = "default_fanout_limit")]
    pub fanout_limit: usize,

    /// Per-connection outbound channel capacity. Backpressure from a slow
    /// store surfaces as a send timeout once this buffer fills.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,

    /// Applier channel capacity for store-originated events.
    #[serde(default = "default_applier_capacity")]
    pub applier_capacity: usize,

    /// How long a new connection may take to present its hello frame.
    #[serde(default = "default_hello_deadline_secs")]
    pub hello_deadline_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            send_timeout_ms: default_send_timeout_ms(),
            fanout_limit: default_fanout_limit(),
            outbound_capacity: default_outbound_capacity(),
            applier_capacity: default_applier_capacity(),
            hello_deadline_secs: default_hello_deadline_secs(),
        }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubSettings {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl HubSettings {
    /// Loads settings from the given file, or the default location, or
    /// falls back to defaults when no file exists. Environment variables
    /// override whatever was loaded.
    pub fn load_or_default(path: Option<PathBuf>) -> Self {
        let path = path.or_else(Self::default_config_path);
        let mut settings = match path {
            Some(ref path) if path.exists() => match Self::load(path) {
                Ok(settings) => {
                    info!(path = %path.display(), "Loaded hub configuration");
                    settings
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                    HubSettings::default()
                }
            },
            _ => {
                debug!("No config file found, using defaults");
                HubSettings::default()
            }
        };
        settings.apply_env_overrides();
        settings
    }

    /// Loads settings from a TOML file.
    pub fn load(path: &PathBuf) -> HubResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| HubError::ConfigLoad(e.to_string()))?;
        let settings: HubSettings = toml::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Default config file location for this platform.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "vertex", "vertex-erp")
            .map(|dirs| dirs.config_dir().join("hub.toml"))
    }

    /// Applies `VERTEX_*` environment overrides on top of loaded values.
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("VERTEX_BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Ok(port) = std::env::var("VERTEX_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid VERTEX_PORT"),
            }
        }
        if let Ok(timeout) = std::env::var("VERTEX_SEND_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => self.sync.send_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid VERTEX_SEND_TIMEOUT_MS"),
            }
        }
        if let Ok(limit) = std::env::var("VERTEX_FANOUT_LIMIT") {
            match limit.parse() {
                Ok(limit) => self.sync.fanout_limit = limit,
                Err(_) => warn!(value = %limit, "Ignoring invalid VERTEX_FANOUT_LIMIT"),
            }
        }
    }

    /// Rejects configurations that cannot work at runtime.
    pub fn validate(&self) -> HubResult<()> {
        if self.sync.send_timeout_ms == 0 {
            return Err(HubError::InvalidConfig("send_timeout_ms must be > 0".into()));
        }
        if self.sync.fanout_limit == 0 {
            return Err(HubError::InvalidConfig("fanout_limit must be > 0".into()));
        }
        if self.sync.outbound_capacity == 0 {
            return Err(HubError::InvalidConfig("outbound_capacity must be > 0".into()));
        }
        if self.sync.applier_capacity == 0 {
            return Err(HubError::InvalidConfig("applier_capacity must be > 0".into()));
        }
        if self.sync.hello_deadline_secs == 0 {
            return Err(HubError::InvalidConfig("hello_deadline_secs must be > 0".into()));
        }
        Ok(())
    }

    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.bind_addr, self.server.port)
    }

    /// Per-send timeout as a `Duration`.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.sync.send_timeout_ms)
    }

    /// Hello handshake deadline as a `Duration`.
    pub fn hello_deadline(&self) -> Duration {
        Duration::from_secs(self.sync.hello_deadline_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = HubSettings::default();
        settings.validate().expect("defaults validate");
        assert_eq!(settings.server.port, DEFAULT_PORT);
        assert_eq!(settings.bind_address(), format!("0.0.0.0:{DEFAULT_PORT}"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: HubSettings = toml::from_str(
            r#"
            [server]
            port = 7001

            [sync]
            send_timeout_ms = 250
            "#,
        )
        .expect("parses");

        assert_eq!(settings.server.port, 7001);
        assert_eq!(settings.server.bind_addr, "0.0.0.0");
        assert_eq!(settings.send_timeout(), Duration::from_millis(250));
        assert_eq!(settings.sync.fanout_limit, default_fanout_limit());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let settings: HubSettings = toml::from_str(
            r#"
            [sync]
            send_timeout_ms = 0
            "#,
        )
        .expect("parses");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_override_wins() {
        std::env::set_var("VERTEX_PORT", "7999");
        let mut settings = HubSettings::default();
        settings.apply_env_overrides();
        std::env::remove_var("VERTEX_PORT");

        assert_eq!(settings.server.port, 7999);
    }
}

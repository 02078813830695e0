//! WolfPeer Configuration
//!
//! This module provides configuration structures for the WolfPeer
//! WireGuard peer control plane.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::allocator::Subnet;

/// Main WolfPeer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfPeerConfig {
    /// WireGuard interface configuration
    #[serde(default)]
    pub interface: InterfaceConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Address allocation configuration
    #[serde(default)]
    pub allocation: AllocationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// WireGuard interface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface managed by this node
    #[serde(default = "default_interface_name")]
    pub name: String,

    /// Path to the `wg` tool
    #[serde(default = "default_wg_path")]
    pub wg_path: String,

    /// Upper bound on a single `wg` invocation in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default)]
    pub cors_enabled: bool,

    /// Answer 404 instead of 200 when removing a peer that is not configured
    #[serde(default)]
    pub strict_remove: bool,
}

/// Address allocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Subnet used by `/available-ip` and by adds without allowed-IPs
    #[serde(default = "default_subnet")]
    pub default_subnet: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_interface_name() -> String {
    "wg0".to_string()
}

fn default_wg_path() -> String {
    "wg".to_string()
}

fn default_command_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:14500".to_string()
}

fn default_subnet() -> String {
    "10.200.200.0/32".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: default_interface_name(),
            wg_path: default_wg_path(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
            cors_enabled: false,
            strict_remove: false,
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            default_subnet: default_subnet(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl InterfaceConfig {
    /// Get command timeout as Duration
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl WolfPeerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfPeerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML, as written by `wolfpeer init`
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.interface.name.trim().is_empty() {
            return Err(crate::Error::Config("interface.name cannot be empty".into()));
        }

        if self.interface.wg_path.trim().is_empty() {
            return Err(crate::Error::Config("interface.wg_path cannot be empty".into()));
        }

        if self.interface.command_timeout_secs == 0 {
            return Err(crate::Error::Config(
                "interface.command_timeout_secs must be greater than 0".into(),
            ));
        }

        self.bind_address()?;
        self.default_subnet()?;

        Ok(())
    }

    /// Parsed API bind address
    pub fn bind_address(&self) -> crate::Result<SocketAddr> {
        self.api.bind_address.parse().map_err(|_| {
            crate::Error::Config(format!(
                "api.bind_address is not a valid socket address: {}",
                self.api.bind_address
            ))
        })
    }

    /// Parsed default allocation subnet
    pub fn default_subnet(&self) -> crate::Result<Subnet> {
        self.allocation.default_subnet.parse()
    }

    /// Replace the port of the API bind address
    pub fn set_port(&mut self, port: u16) -> crate::Result<()> {
        let mut addr = self.bind_address()?;
        addr.set_port(port);
        self.api.bind_address = addr.to_string();
        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        PathBuf::from("wolfpeer.toml")
    }
}

//! Node Configuration
//!
//! Network identity, listening ports and transport limits for the peer RPC
//! service. Loaded from TOML, then overridden from the command line.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::handshake::NodeVersion;
use crate::types::BROADHASH_LEN;

/// Main configuration for the peer RPC service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    // === Identity ===

    /// Network identifier (hex), peers must advertise the same value
    pub nethash: String,

    /// Oldest peer software version we accept
    pub min_version: String,

    /// Version advertised by this node
    pub node_version: String,

    /// Operating system advertised by this node
    pub os: String,

    /// Chain height reported before any block is applied
    pub initial_height: u64,

    // === Network ===

    /// Bind address for both listeners
    pub bind_address: String,

    /// Port for the peer transport (TCP)
    pub ws_port: u16,

    /// Port for HTTP API
    pub api_port: u16,

    // === Limits ===

    /// Time allowed for a connecting peer to send its handshake (seconds)
    pub connection_timeout_secs: u64,

    /// Largest frame accepted on the transport (bytes)
    pub max_frame_size: usize,

    // === Directory ===

    /// Interval for flushing discovered peers into the directory (seconds)
    pub discovery_flush_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            // Identity
            nethash: "198f2b61a8eb95fbeed58b8216780b68f697f26b849acf00c8c93bb9b24f783d".to_string(),
            min_version: "0.0.0a".to_string(),
            node_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            initial_height: 1,

            // Network
            bind_address: "0.0.0.0".to_string(),
            ws_port: 5000,
            api_port: 4000,

            // Limits
            connection_timeout_secs: 30,
            max_frame_size: 1024 * 1024, // 1 MiB

            // Directory
            discovery_flush_secs: 10,
        }
    }
}

impl NodeConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    // Builder-style methods for CLI overrides

    pub fn with_ws_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.ws_port = port;
        }
        self
    }

    pub fn with_api_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.api_port = port;
        }
        self
    }

    pub fn with_nethash(mut self, nethash: Option<String>) -> Self {
        if let Some(nethash) = nethash {
            self.nethash = nethash;
        }
        self
    }

    pub fn with_min_version(mut self, version: Option<String>) -> Self {
        if let Some(version) = version {
            self.min_version = version;
        }
        self
    }

    /// Parsed minimum compatible version
    pub fn min_node_version(&self) -> anyhow::Result<NodeVersion> {
        self.min_version
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid min_version {:?}: {}", self.min_version, e))
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        let nethash = hex::decode(&self.nethash)
            .map_err(|e| anyhow::anyhow!("nethash is not valid hex: {}", e))?;
        if nethash.len() != BROADHASH_LEN {
            anyhow::bail!(
                "nethash must be {} bytes, got {}",
                BROADHASH_LEN,
                nethash.len()
            );
        }

        self.min_node_version()?;

        if self.node_version.parse::<NodeVersion>().is_err() {
            anyhow::bail!("node_version {:?} is not a valid version", self.node_version);
        }

        if self.ws_port == self.api_port {
            anyhow::bail!(
                "ws_port and api_port must differ (both {})",
                self.ws_port
            );
        }

        if self.connection_timeout_secs == 0 {
            anyhow::bail!("connection_timeout_secs must be greater than 0");
        }

        if self.max_frame_size < 1024 {
            anyhow::bail!(
                "max_frame_size ({}) must be at least 1024 bytes",
                self.max_frame_size
            );
        }

        if self.discovery_flush_secs == 0 {
            anyhow::bail!("discovery_flush_secs must be greater than 0");
        }

        Ok(())
    }
}

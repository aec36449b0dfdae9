//! Centralized Configuration Management
//!
//! All tunables of the router, reassembler, gate and watch client live here so
//! that a single TOML file can configure a whole endpoint.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::assist::DEFAULT_SAMPLE_RATE;
use crate::errors::{Result, WristlinkError};

// ----------------------------------------------------------------------------
// Reassembly Configuration
// ----------------------------------------------------------------------------

/// Limits for the chunk reassembly buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// Sessions that receive no chunk for this long are discarded
    pub session_ttl_secs: u64,
    /// Maximum number of concurrently buffered sessions
    pub max_sessions: usize,
    /// Maximum buffered bytes per session
    pub max_session_bytes: usize,
    /// Sample rate attached to reassembled audio
    pub sample_rate: u32,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 60,
            max_sessions: 16,
            max_session_bytes: 8 * 1024 * 1024,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl ReassemblyConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            session_ttl_secs: 5,
            max_sessions: 4,
            max_session_bytes: 64 * 1024,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

// ----------------------------------------------------------------------------
// Gate Configuration
// ----------------------------------------------------------------------------

/// Background task completion gate settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Upper bound on how long a drain may keep tasks parked
    pub watchdog_interval_secs: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            watchdog_interval_secs: 10,
        }
    }
}

impl GateConfig {
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn testing() -> Self {
        Self {
            watchdog_interval_secs: 1,
        }
    }
}

// ----------------------------------------------------------------------------
// Client Configuration
// ----------------------------------------------------------------------------

/// Watch-side client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Audio larger than this is sent as chunks of this size
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn testing() -> Self {
        Self { chunk_size: 4 }
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for runtime channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Inbound events from the transport to the endpoint task
    pub inbound_buffer_size: usize,
    /// Outbound messages from the endpoint to the transport
    pub outbound_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            inbound_buffer_size: 128, // Chunk bursts arrive back to back
            outbound_buffer_size: 64,
        }
    }
}

impl ChannelConfig {
    pub fn testing() -> Self {
        Self {
            inbound_buffer_size: 100,
            outbound_buffer_size: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

/// Complete endpoint configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WristlinkConfig {
    pub reassembly: ReassemblyConfig,
    pub gate: GateConfig,
    pub client: ClientConfig,
    pub channels: ChannelConfig,
}

impl WristlinkConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            reassembly: ReassemblyConfig::testing(),
            gate: GateConfig::testing(),
            client: ClientConfig::testing(),
            channels: ChannelConfig::testing(),
        }
    }

    /// Parse a TOML document; absent sections keep their defaults
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| WristlinkError::config_error(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| WristlinkError::config_error(format!("Cannot encode TOML: {}", e)))
    }

    pub fn with_reassembly(mut self, reassembly: ReassemblyConfig) -> Self {
        self.reassembly = reassembly;
        self
    }

    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<()> {
        if self.reassembly.session_ttl_secs == 0 {
            return Err(WristlinkError::config_error("Session TTL cannot be zero"));
        }
        if self.reassembly.max_sessions == 0 {
            return Err(WristlinkError::config_error("Max sessions cannot be zero"));
        }
        if self.reassembly.max_session_bytes == 0 {
            return Err(WristlinkError::config_error("Max session bytes cannot be zero"));
        }
        if self.reassembly.sample_rate == 0 {
            return Err(WristlinkError::config_error("Sample rate cannot be zero"));
        }
        if self.gate.watchdog_interval_secs == 0 {
            return Err(WristlinkError::config_error("Watchdog interval cannot be zero"));
        }
        if self.client.chunk_size == 0 {
            return Err(WristlinkError::config_error("Chunk size cannot be zero"));
        }
        if self.channels.inbound_buffer_size == 0 || self.channels.outbound_buffer_size == 0 {
            return Err(WristlinkError::config_error("Channel buffer sizes cannot be zero"));
        }
        Ok(())
    }
}

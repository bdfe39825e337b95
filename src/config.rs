//! Configuration for tablesync
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a table instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// Human-readable name sent to peers in the handshake
    pub node_name: String,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address (server mode)
    pub listen_addr: String,

    /// Max concurrent client connections (server mode)
    pub max_connections: usize,

    /// Idle interval after which a keepalive frame is written (milliseconds)
    pub keepalive_interval_ms: u64,

    /// Connection read timeout (milliseconds). A peer silent for this long is dropped.
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,

    /// Reconnect policy (client mode)
    pub reconnect: ReconnectPolicy,

    // -------------------------------------------------------------------------
    // Table Policies
    // -------------------------------------------------------------------------
    /// What a client does with its entries when the server link drops
    pub disconnect_policy: DisconnectPolicy,

    /// What a local set does when the stored type differs
    pub type_policy: TypePolicy,

    /// Key prefix marking metadata keys (structured sub-tables)
    pub metadata_prefix: String,

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------
    /// Snapshot file for persistent entries. Loaded on server start, saved on shutdown.
    pub persist_path: Option<PathBuf>,
}

/// Client behaviour when its connection to the server is lost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectPolicy {
    /// Delete every entry not flagged persistent (full reset)
    ClearNonPersistent,

    /// Keep last-known state; the next handshake reconciles it
    Retain,
}

/// Local set behaviour when the new value's type differs from the stored one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePolicy {
    /// Accept the write and change the entry's type
    Retype,

    /// Refuse the write with `SyncError::TypeConflict`
    Reject,
}

/// Exponential reconnect backoff
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    /// First delay after a failed or dropped connection (milliseconds, >= 1000)
    pub initial_ms: u64,

    /// Upper bound on the delay (milliseconds)
    pub max_ms: u64,

    /// Growth factor applied after every failed attempt
    pub multiplier: u32,
}

impl ReconnectPolicy {
    /// Smallest delay the client will ever wait between attempts
    pub const MIN_DELAY_MS: u64 = 1000;

    /// Delay before attempt number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let initial = self.initial_ms.max(Self::MIN_DELAY_MS);
        let factor = (self.multiplier.max(1) as u64).saturating_pow(attempt.min(16));
        let ms = initial.saturating_mul(factor).min(self.max_ms.max(initial));
        Duration::from_millis(ms)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_ms: 1000,
            max_ms: 30_000,
            multiplier: 2,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: "tablesync".to_string(),
            listen_addr: "0.0.0.0:1735".to_string(),
            max_connections: 64,
            keepalive_interval_ms: 1000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            reconnect: ReconnectPolicy::default(),
            disconnect_policy: DisconnectPolicy::ClearNonPersistent,
            type_policy: TypePolicy::Retype,
            metadata_prefix: ".".to_string(),
            persist_path: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the name announced to peers
    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.config.node_name = name.into();
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the keepalive interval (in milliseconds)
    pub fn keepalive_interval_ms(mut self, ms: u64) -> Self {
        self.config.keepalive_interval_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the reconnect backoff policy
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    /// Set the disconnect policy
    pub fn disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.config.disconnect_policy = policy;
        self
    }

    /// Set the type-conflict policy
    pub fn type_policy(mut self, policy: TypePolicy) -> Self {
        self.config.type_policy = policy;
        self
    }

    /// Set the metadata key prefix
    pub fn metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.metadata_prefix = prefix.into();
        self
    }

    /// Set the persistent-entry snapshot file
    pub fn persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.persist_path = Some(path.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Lorikeet device-management service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use lorikeet_core::{DevAddrPrefix, LorikeetError, NetId};
use serde::{Deserialize, Serialize};

/// Top-level Lorikeet configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LorikeetConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Network identity and DevAddr allocation.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Activation behaviour.
    #[serde(default)]
    pub activation: ActivationConfig,

    /// Downlink queue limits.
    #[serde(default)]
    pub queue: QueueConfig,
}

impl LorikeetConfig {
    /// Render the configuration as a TOML document.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Instance name, used in log output.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_server_name() -> String {
    "lorikeet".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long SQLite waits on a locked database before failing, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("lorikeet").join("lorikeet.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("lorikeet.db"))
        .to_string_lossy()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Network identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// NetID of this network server, as 6 hex characters.
    #[serde(default = "default_net_id")]
    pub net_id: String,

    /// Explicit DevAddr prefixes (`26000000/7`). When empty, the prefix is
    /// derived from `net_id`.
    #[serde(default)]
    pub dev_addr_prefixes: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            net_id: default_net_id(),
            dev_addr_prefixes: Vec::new(),
        }
    }
}

fn default_net_id() -> String {
    "000000".to_string()
}

impl NetworkConfig {
    /// Parsed NetID.
    pub fn net_id(&self) -> Result<NetId, LorikeetError> {
        self.net_id
            .parse()
            .map_err(|e: LorikeetError| LorikeetError::Config(format!("network.net_id: {e}")))
    }

    /// Prefixes used for random DevAddr allocation.
    pub fn dev_addr_prefixes(&self) -> Result<Vec<DevAddrPrefix>, LorikeetError> {
        if self.dev_addr_prefixes.is_empty() {
            return Ok(vec![self.net_id()?.dev_addr_prefix()]);
        }
        self.dev_addr_prefixes
            .iter()
            .map(|p| {
                p.parse().map_err(|e: LorikeetError| {
                    LorikeetError::Config(format!("network.dev_addr_prefixes: {e}"))
                })
            })
            .collect()
    }
}

/// Activation behaviour configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActivationConfig {
    /// Remove all queued downlinks when a new session is installed or the
    /// session is destroyed. When false, in-flight items return to pending.
    #[serde(default)]
    pub flush_queue_on_activate: bool,

    /// Random DevAddr candidates tried before giving up.
    #[serde(default = "default_dev_addr_max_attempts")]
    pub dev_addr_max_attempts: u32,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            flush_queue_on_activate: false,
            dev_addr_max_attempts: default_dev_addr_max_attempts(),
        }
    }
}

fn default_dev_addr_max_attempts() -> u32 {
    16
}

/// Downlink queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Largest accepted FRMPayload in bytes.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Expiry applied to items enqueued without one. `None` keeps them until sent.
    #[serde(default)]
    pub default_ttl_secs: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_payload_size: default_max_payload_size(),
            default_ttl_secs: None,
        }
    }
}

fn default_max_payload_size() -> usize {
    242
}

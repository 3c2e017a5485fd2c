// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine settings resolved from the file configuration.

use chrono::TimeDelta;
use lorikeet_config::LorikeetConfig;
use lorikeet_core::{DevAddrPrefix, LorikeetError, NetId};

/// Parsed, ready-to-use engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub net_id: NetId,
    /// Prefixes random DevAddrs are drawn from. Never empty.
    pub dev_addr_prefixes: Vec<DevAddrPrefix>,
    pub dev_addr_max_attempts: u32,
    pub flush_queue_on_activate: bool,
    pub max_payload_size: usize,
    /// Expiry applied to queue items enqueued without one.
    pub default_ttl: Option<TimeDelta>,
}

impl EngineConfig {
    pub fn from_config(config: &LorikeetConfig) -> Result<Self, LorikeetError> {
        let default_ttl = config
            .queue
            .default_ttl_secs
            .map(|secs| {
                i64::try_from(secs)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .ok_or_else(|| {
                        LorikeetError::Config(format!("queue.default_ttl_secs: {secs} is out of range"))
                    })
            })
            .transpose()?;

        Ok(Self {
            net_id: config.network.net_id()?,
            dev_addr_prefixes: config.network.dev_addr_prefixes()?,
            dev_addr_max_attempts: config.activation.dev_addr_max_attempts.max(1),
            flush_queue_on_activate: config.activation.flush_queue_on_activate,
            max_payload_size: config.queue.max_payload_size,
            default_ttl,
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let net_id = NetId::default();
        Self {
            net_id,
            dev_addr_prefixes: vec![net_id.dev_addr_prefix()],
            dev_addr_max_attempts: 16,
            flush_queue_on_activate: false,
            max_payload_size: 242,
            default_ttl: None,
        }
    }
}

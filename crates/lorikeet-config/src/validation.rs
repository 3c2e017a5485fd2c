// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: the NetID and DevAddr
//! prefixes must parse, limits must be positive, and the log level must be
//! one `tracing` understands.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::LorikeetConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &LorikeetConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.server.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "server.log_level `{}` is not one of {}",
                config.server.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if let Err(e) = config.network.net_id() {
        errors.push(ConfigError::Validation {
            message: e.to_string(),
        });
    } else if let Err(e) = config.network.dev_addr_prefixes() {
        errors.push(ConfigError::Validation {
            message: e.to_string(),
        });
    }

    let mut seen = HashSet::new();
    for prefix in &config.network.dev_addr_prefixes {
        if !seen.insert(prefix.trim()) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate DevAddr prefix `{prefix}` in network.dev_addr_prefixes"),
            });
        }
    }

    if config.activation.dev_addr_max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "activation.dev_addr_max_attempts must be at least 1".to_string(),
        });
    }

    if config.queue.max_payload_size == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.max_payload_size must be at least 1".to_string(),
        });
    }

    if config.queue.default_ttl_secs == Some(0) {
        errors.push(ConfigError::Validation {
            message: "queue.default_ttl_secs must be positive when set".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

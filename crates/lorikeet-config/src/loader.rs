// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./lorikeet.toml` > `~/.config/lorikeet/lorikeet.toml` > `/etc/lorikeet/lorikeet.toml`
//! with environment variable overrides via `LORIKEET_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::LorikeetConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/lorikeet/lorikeet.toml` (system-wide)
/// 3. `~/.config/lorikeet/lorikeet.toml` (user XDG config)
/// 4. `./lorikeet.toml` (local directory)
/// 5. `LORIKEET_*` environment variables
pub fn load_config() -> Result<LorikeetConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
pub fn load_config_from_str(toml_content: &str) -> Result<LorikeetConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(LorikeetConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<LorikeetConfig, figment::Error> {
    tracing::debug!(path = %path.display(), "loading configuration file");
    Figment::new()
        .merge(Serialized::defaults(LorikeetConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(LorikeetConfig::default()))
        .merge(Toml::file("/etc/lorikeet/lorikeet.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("lorikeet/lorikeet.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("lorikeet.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `LORIKEET_ACTIVATION_FLUSH_QUEUE_ON_ACTIVATE` must map to
/// `activation.flush_queue_on_activate`.
fn env_provider() -> Env {
    Env::prefixed("LORIKEET_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Only the first segment is a section name.
        let key_str = key.as_str();
        let mapped = SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string());
        mapped.into()
    })
}

/// Top-level config sections addressable through environment variables.
const SECTIONS: &[&str] = &["server", "storage", "network", "activation", "queue"];

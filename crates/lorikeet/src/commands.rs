// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations.
//!
//! Each command opens the configured database, runs one engine operation,
//! prints the result, and checkpoints the database before returning.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lorikeet_config::LorikeetConfig;
use lorikeet_core::models::{DeviceActivation, DeviceListQuery, DevicePage, DeviceQueueItem};
use lorikeet_core::{DevEui, DeviceStore, LorikeetError, PluginAdapter};
use lorikeet_engine::DeviceManager;
use lorikeet_storage::SqliteStorage;
use serde::Serialize;
use tracing::info;

async fn open_store(config: &LorikeetConfig) -> Result<Arc<SqliteStorage>, LorikeetError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(Arc::new(storage))
}

/// Run `op` against an engine over the configured database.
async fn with_manager<T, F, Fut>(config: &LorikeetConfig, op: F) -> Result<T, LorikeetError>
where
    F: FnOnce(DeviceManager) -> Fut,
    Fut: Future<Output = Result<T, LorikeetError>>,
{
    let storage = open_store(config).await?;
    let manager = DeviceManager::from_config(storage.clone(), config)?;
    let result = op(manager).await;
    storage.close().await?;
    result
}

fn to_json<T: Serialize>(value: &T) -> Result<String, LorikeetError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| LorikeetError::Internal(format!("failed to serialize output: {e}")))
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// `lorikeet init`
pub async fn init(config: &LorikeetConfig) -> Result<(), LorikeetError> {
    let storage = open_store(config).await?;
    let health = storage.health_check().await?;
    storage.shutdown().await?;
    info!(path = %config.storage.database_path, "database ready");
    println!(
        "database ready at {} ({health:?})",
        config.storage.database_path
    );
    Ok(())
}

/// `lorikeet check`
pub fn check(config: &LorikeetConfig, print: bool) -> Result<(), LorikeetError> {
    let net_id = config.network.net_id()?;
    let prefixes = config.network.dev_addr_prefixes()?;
    println!("configuration ok (net_id={net_id})");
    for prefix in prefixes {
        println!("  dev_addr prefix {prefix}");
    }
    if print {
        let rendered = config
            .to_toml_string()
            .map_err(|e| LorikeetError::Config(format!("failed to render configuration: {e}")))?;
        println!("{rendered}");
    }
    Ok(())
}

/// `lorikeet devices list`
pub async fn list_devices(
    config: &LorikeetConfig,
    search: Option<String>,
    limit: u32,
    offset: u32,
    json: bool,
) -> Result<(), LorikeetError> {
    let query = DeviceListQuery {
        limit,
        offset,
        search,
    };
    let page = with_manager(config, |manager| async move {
        manager.registry().list(&query).await
    })
    .await?;
    if json {
        println!("{}", to_json(&page.devices)?);
    } else {
        print!("{}", render_devices(&page));
    }
    Ok(())
}

/// `lorikeet dev-addr`
pub async fn dev_addr(config: &LorikeetConfig, dev_eui: DevEui) -> Result<(), LorikeetError> {
    let dev_addr = with_manager(config, |manager| async move {
        manager.activation().get_random_dev_addr(dev_eui).await
    })
    .await?;
    println!("{dev_addr}");
    Ok(())
}

/// `lorikeet nonces flush`
pub async fn flush_nonces(config: &LorikeetConfig, dev_eui: DevEui) -> Result<(), LorikeetError> {
    let removed = with_manager(config, |manager| async move {
        manager.nonces().flush(dev_eui).await
    })
    .await?;
    println!("removed {removed} dev_nonce record(s) of {dev_eui}");
    Ok(())
}

/// `lorikeet queue show`
pub async fn show_queue(
    config: &LorikeetConfig,
    dev_eui: DevEui,
    json: bool,
) -> Result<(), LorikeetError> {
    let items = with_manager(config, |manager| async move {
        manager.queue().get_queue(dev_eui).await
    })
    .await?;
    if json {
        println!("{}", to_json(&items)?);
    } else {
        print!("{}", render_queue(&items));
    }
    Ok(())
}

/// `lorikeet queue flush`
pub async fn flush_queue(config: &LorikeetConfig, dev_eui: DevEui) -> Result<(), LorikeetError> {
    let removed = with_manager(config, |manager| async move {
        manager.queue().flush_queue(dev_eui).await
    })
    .await?;
    println!("removed {removed} queued downlink(s) of {dev_eui}");
    Ok(())
}

/// Session fields safe to print.
#[derive(Debug, Serialize)]
struct ActivationSummary {
    dev_eui: String,
    dev_addr: String,
    mode: String,
    mac_version: String,
    join_eui: Option<String>,
    dev_nonce: Option<u16>,
    join_nonce: Option<u32>,
    f_cnt_up: u32,
    n_f_cnt_down: u32,
    a_f_cnt_down: u32,
    last_acked_f_cnt_down: Option<u32>,
    activated_at: DateTime<Utc>,
}

impl From<&DeviceActivation> for ActivationSummary {
    fn from(a: &DeviceActivation) -> Self {
        Self {
            dev_eui: a.dev_eui.to_string(),
            dev_addr: a.dev_addr.to_string(),
            mode: a.mode.to_string(),
            mac_version: a.mac_version.to_string(),
            join_eui: a.join_eui.map(|e| e.to_string()),
            dev_nonce: a.dev_nonce,
            join_nonce: a.join_nonce,
            f_cnt_up: a.f_cnt_up,
            n_f_cnt_down: a.n_f_cnt_down,
            a_f_cnt_down: a.a_f_cnt_down,
            last_acked_f_cnt_down: a.last_acked_f_cnt_down,
            activated_at: a.activated_at,
        }
    }
}

/// `lorikeet activation show`
pub async fn show_activation(
    config: &LorikeetConfig,
    dev_eui: DevEui,
    json: bool,
) -> Result<(), LorikeetError> {
    let activation = with_manager(config, |manager| async move {
        manager.activation().get_activation(dev_eui).await
    })
    .await?;
    let summary = ActivationSummary::from(&activation);
    if json {
        println!("{}", to_json(&summary)?);
    } else {
        print!("{}", render_activation(&summary));
    }
    Ok(())
}

/// `lorikeet activation deactivate`
pub async fn deactivate(config: &LorikeetConfig, dev_eui: DevEui) -> Result<(), LorikeetError> {
    with_manager(config, |manager| async move {
        manager.activation().deactivate(dev_eui).await
    })
    .await?;
    println!("{dev_eui} deactivated");
    Ok(())
}

fn render_devices(page: &DevicePage) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16}  {:<24}  {:<8}  {}",
        "DEV_EUI", "NAME", "ENABLED", "LAST SEEN"
    );
    for device in &page.devices {
        let _ = writeln!(
            out,
            "{:<16}  {:<24}  {:<8}  {}",
            device.dev_eui,
            device.name,
            if device.is_disabled { "no" } else { "yes" },
            format_time(device.last_seen_at)
        );
    }
    let _ = writeln!(out, "{} of {} device(s)", page.devices.len(), page.total_count);
    out
}

fn render_queue(items: &[DeviceQueueItem]) -> String {
    if items.is_empty() {
        return "queue is empty\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<4}  {:<36}  {:<5}  {:<9}  {:<9}  {:<8}  {}",
        "#", "ID", "PORT", "CONFIRMED", "STATUS", "F_CNT", "EXPIRES"
    );
    for (position, item) in items.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<4}  {:<36}  {:<5}  {:<9}  {:<9}  {:<8}  {}",
            position,
            item.id,
            item.f_port,
            if item.confirmed { "yes" } else { "no" },
            item.status,
            item.f_cnt_down
                .map(|f| f.to_string())
                .unwrap_or_else(|| "-".into()),
            format_time(item.expires_at)
        );
    }
    out
}

fn render_activation(summary: &ActivationSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "dev_eui      {}", summary.dev_eui);
    let _ = writeln!(out, "dev_addr     {}", summary.dev_addr);
    let _ = writeln!(out, "mode         {} (LoRaWAN {})", summary.mode, summary.mac_version);
    if let Some(join_eui) = &summary.join_eui {
        let _ = writeln!(out, "join_eui     {join_eui}");
    }
    let _ = writeln!(
        out,
        "f_cnt        up={} n_down={} a_down={} last_ack={}",
        summary.f_cnt_up,
        summary.n_f_cnt_down,
        summary.a_f_cnt_down,
        summary
            .last_acked_f_cnt_down
            .map(|f| f.to_string())
            .unwrap_or_else(|| "-".into())
    );
    let _ = writeln!(out, "activated_at {}", format_time(Some(summary.activated_at)));
    out
}

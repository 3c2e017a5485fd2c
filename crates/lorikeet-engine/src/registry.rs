// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device record CRUD.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lorikeet_core::models::{Device, DeviceListQuery, DevicePage};
use lorikeet_core::{DevEui, LorikeetError};
use tracing::{debug, info};

use crate::SharedStore;
use crate::locks::DeviceLocks;

/// Registry of devices keyed by DevEUI.
#[derive(Clone)]
pub struct DeviceRegistry {
    store: SharedStore,
    locks: Arc<DeviceLocks>,
}

impl DeviceRegistry {
    pub fn new(store: SharedStore, locks: Arc<DeviceLocks>) -> Self {
        Self { store, locks }
    }

    /// Register a new device. Fails with `AlreadyExists` on a duplicate DevEUI.
    pub async fn create(&self, mut device: Device) -> Result<Device, LorikeetError> {
        validate_device(&device)?;
        let now = Utc::now();
        device.created_at = now;
        device.updated_at = now;
        device.last_seen_at = None;
        self.store.create_device(&device).await?;
        info!(dev_eui = %device.dev_eui, name = %device.name, "device created");
        Ok(device)
    }

    pub async fn get(&self, dev_eui: DevEui) -> Result<Device, LorikeetError> {
        self.store
            .get_device(dev_eui)
            .await?
            .ok_or_else(|| LorikeetError::device_not_found(dev_eui))
    }

    /// Replace the mutable fields of a device. Creation and last-seen
    /// timestamps are kept.
    pub async fn update(&self, mut device: Device) -> Result<Device, LorikeetError> {
        validate_device(&device)?;
        let _guard = self.locks.lock(device.dev_eui).await;
        let existing = self.get(device.dev_eui).await?;
        device.created_at = existing.created_at;
        device.last_seen_at = existing.last_seen_at;
        device.updated_at = Utc::now();
        self.store.update_device(&device).await?;
        info!(dev_eui = %device.dev_eui, "device updated");
        Ok(device)
    }

    /// Delete a device together with its keys, session, nonce history and queue.
    pub async fn delete(&self, dev_eui: DevEui) -> Result<(), LorikeetError> {
        let _guard = self.locks.lock(dev_eui).await;
        if !self.store.delete_device(dev_eui).await? {
            return Err(LorikeetError::device_not_found(dev_eui));
        }
        info!(dev_eui = %dev_eui, "device deleted");
        Ok(())
    }

    pub async fn list(&self, query: &DeviceListQuery) -> Result<DevicePage, LorikeetError> {
        let page = self.store.list_devices(query).await?;
        debug!(
            total = page.total_count,
            returned = page.devices.len(),
            "listed devices"
        );
        Ok(page)
    }

    /// Record uplink activity.
    pub async fn mark_seen(&self, dev_eui: DevEui, at: DateTime<Utc>) -> Result<(), LorikeetError> {
        self.store.mark_device_seen(dev_eui, at).await
    }
}

fn validate_device(device: &Device) -> Result<(), LorikeetError> {
    if device.dev_eui.is_zero() {
        return Err(LorikeetError::InvalidParameters(
            "dev_eui must not be all zeros".into(),
        ));
    }
    if device.name.trim().is_empty() {
        return Err(LorikeetError::InvalidParameters(
            "device name must not be empty".into(),
        ));
    }
    if device.device_profile_id.trim().is_empty() {
        return Err(LorikeetError::InvalidParameters(
            "device_profile_id must not be empty".into(),
        ));
    }
    Ok(())
}

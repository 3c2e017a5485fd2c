// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device service capability interface consumed by the transport layer.
//!
//! Every operation has a default body returning
//! [`LorikeetError::Unimplemented`], so adding an operation here never breaks
//! an existing implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LorikeetError;
use crate::models::{
    ActivationRequest, Device, DeviceActivation, DeviceKeys, DeviceLinkMetrics, DeviceListQuery,
    DeviceMetrics, DevicePage, DeviceQueueItem, EnqueuedItem, NewQueueItem,
};
use crate::types::{DevAddr, DevEui};

/// The device-management operation surface.
#[async_trait]
pub trait DeviceService: Send + Sync {
    // --- Device CRUD ---

    async fn create(&self, _device: Device) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("Create"))
    }

    async fn get(&self, _dev_eui: DevEui) -> Result<Device, LorikeetError> {
        Err(LorikeetError::Unimplemented("Get"))
    }

    async fn update(&self, _device: Device) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("Update"))
    }

    async fn delete(&self, _dev_eui: DevEui) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("Delete"))
    }

    async fn list(&self, _query: DeviceListQuery) -> Result<DevicePage, LorikeetError> {
        Err(LorikeetError::Unimplemented("List"))
    }

    // --- Keys ---

    async fn create_keys(&self, _keys: DeviceKeys) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("CreateKeys"))
    }

    async fn get_keys(&self, _dev_eui: DevEui) -> Result<DeviceKeys, LorikeetError> {
        Err(LorikeetError::Unimplemented("GetKeys"))
    }

    async fn update_keys(&self, _keys: DeviceKeys) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("UpdateKeys"))
    }

    async fn delete_keys(&self, _dev_eui: DevEui) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("DeleteKeys"))
    }

    async fn flush_dev_nonces(&self, _dev_eui: DevEui) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("FlushDevNonces"))
    }

    // --- Activation ---

    async fn activate(
        &self,
        _dev_eui: DevEui,
        _request: ActivationRequest,
    ) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("Activate"))
    }

    async fn deactivate(&self, _dev_eui: DevEui) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("Deactivate"))
    }

    async fn get_activation(&self, _dev_eui: DevEui) -> Result<DeviceActivation, LorikeetError> {
        Err(LorikeetError::Unimplemented("GetActivation"))
    }

    async fn get_random_dev_addr(&self, _dev_eui: DevEui) -> Result<DevAddr, LorikeetError> {
        Err(LorikeetError::Unimplemented("GetRandomDevAddr"))
    }

    // --- Metrics ---

    async fn get_metrics(
        &self,
        _dev_eui: DevEui,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<DeviceMetrics, LorikeetError> {
        Err(LorikeetError::Unimplemented("GetMetrics"))
    }

    async fn get_link_metrics(
        &self,
        _dev_eui: DevEui,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<DeviceLinkMetrics, LorikeetError> {
        Err(LorikeetError::Unimplemented("GetLinkMetrics"))
    }

    // --- Downlink queue ---

    async fn enqueue(
        &self,
        _dev_eui: DevEui,
        _item: NewQueueItem,
    ) -> Result<EnqueuedItem, LorikeetError> {
        Err(LorikeetError::Unimplemented("Enqueue"))
    }

    async fn flush_queue(&self, _dev_eui: DevEui) -> Result<(), LorikeetError> {
        Err(LorikeetError::Unimplemented("FlushQueue"))
    }

    async fn get_queue(&self, _dev_eui: DevEui) -> Result<Vec<DeviceQueueItem>, LorikeetError> {
        Err(LorikeetError::Unimplemented("GetQueue"))
    }
}

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository trait for device, key, session, nonce, and queue persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LorikeetError;
use crate::models::{
    ActivationCommit, ConsumedNonce, Device, DeviceActivation, DeviceKeys, DeviceListQuery,
    DevicePage, DeviceQueueItem, EnqueuedItem, NewQueueItem, QueueMutation, QueuePolicy,
};
use crate::traits::adapter::PluginAdapter;
use crate::types::{DevAddr, DevEui, JoinEui};

/// Persistence backend used by the engine.
///
/// Every method is a single transaction: it either applies completely or
/// leaves the store untouched. Methods never retry; a backend failure is
/// returned as [`LorikeetError::StorageUnavailable`].
#[async_trait]
pub trait DeviceStore: PluginAdapter {
    /// Opens the backend and applies pending schema migrations.
    async fn initialize(&self) -> Result<(), LorikeetError>;

    /// Closes the backend, flushing pending writes.
    async fn close(&self) -> Result<(), LorikeetError>;

    // --- Devices ---

    /// Fails with `AlreadyExists` on a duplicate DevEUI.
    async fn create_device(&self, device: &Device) -> Result<(), LorikeetError>;

    async fn get_device(&self, dev_eui: DevEui) -> Result<Option<Device>, LorikeetError>;

    /// Replaces the mutable fields. Fails with `NotFound` for an unknown DevEUI.
    async fn update_device(&self, device: &Device) -> Result<(), LorikeetError>;

    /// Deletes the device and everything it owns. Returns false if it did not exist.
    async fn delete_device(&self, dev_eui: DevEui) -> Result<bool, LorikeetError>;

    async fn list_devices(&self, query: &DeviceListQuery) -> Result<DevicePage, LorikeetError>;

    async fn mark_device_seen(
        &self,
        dev_eui: DevEui,
        at: DateTime<Utc>,
    ) -> Result<(), LorikeetError>;

    // --- Keys ---

    /// Fails with `NotFound` for an unknown device, `AlreadyExists` if keys exist.
    async fn create_keys(&self, keys: &DeviceKeys) -> Result<(), LorikeetError>;

    async fn get_keys(&self, dev_eui: DevEui) -> Result<Option<DeviceKeys>, LorikeetError>;

    /// Fails with `NotFound` if the device has no keys.
    async fn update_keys(&self, keys: &DeviceKeys) -> Result<(), LorikeetError>;

    async fn delete_keys(&self, dev_eui: DevEui) -> Result<bool, LorikeetError>;

    // --- DevNonce history ---

    async fn is_dev_nonce_used(
        &self,
        dev_eui: DevEui,
        join_eui: JoinEui,
        dev_nonce: u16,
    ) -> Result<bool, LorikeetError>;

    /// Records a nonce. Fails with `ReplayDetected` if it was already recorded
    /// and `allow_reuse` is false.
    async fn consume_dev_nonce(
        &self,
        dev_eui: DevEui,
        nonce: ConsumedNonce,
    ) -> Result<(), LorikeetError>;

    /// Removes the nonce history of a device, returning the number of entries.
    async fn flush_dev_nonces(&self, dev_eui: DevEui) -> Result<u64, LorikeetError>;

    // --- Activation ---

    async fn get_activation(
        &self,
        dev_eui: DevEui,
    ) -> Result<Option<DeviceActivation>, LorikeetError>;

    /// Installs a session, replacing any existing one, together with the
    /// nonce record, JoinNonce update, and queue policy.
    ///
    /// Fails with `NotFound`, `ReplayDetected`, or `AddressConflict`.
    async fn commit_activation(&self, commit: &ActivationCommit) -> Result<(), LorikeetError>;

    /// Removes the session and applies the queue policy. Returns false if
    /// there was no session.
    async fn delete_activation(
        &self,
        dev_eui: DevEui,
        queue_policy: QueuePolicy,
    ) -> Result<bool, LorikeetError>;

    /// True if a session other than `exclude`'s holds the address.
    async fn dev_addr_in_use(
        &self,
        dev_addr: DevAddr,
        exclude: Option<DevEui>,
    ) -> Result<bool, LorikeetError>;

    // --- Downlink queue ---

    /// Appends an item at the tail. Fails with `NotFound` for an unknown device.
    async fn enqueue(
        &self,
        dev_eui: DevEui,
        item: &NewQueueItem,
    ) -> Result<EnqueuedItem, LorikeetError>;

    /// All items of the device in insertion order.
    async fn list_queue(&self, dev_eui: DevEui) -> Result<Vec<DeviceQueueItem>, LorikeetError>;

    /// Removes all items of the device, returning the number removed.
    async fn flush_queue(&self, dev_eui: DevEui) -> Result<u64, LorikeetError>;

    /// Applies the queue changes and counter update produced by the downlink
    /// planner. Fails with `Internal` if the counter no longer has its
    /// expected value.
    async fn apply_queue_mutation(
        &self,
        dev_eui: DevEui,
        mutation: &QueueMutation,
    ) -> Result<(), LorikeetError>;
}

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store wrapper with injectable failures.
//!
//! `FaultyStore` delegates to a real [`DeviceStore`] and returns
//! `StorageUnavailable` for operations armed with [`FaultyStore::fail`].
//! A failed operation never reaches the inner store.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use lorikeet_core::models::{
    ActivationCommit, ConsumedNonce, Device, DeviceActivation, DeviceKeys, DeviceListQuery,
    DevicePage, DeviceQueueItem, EnqueuedItem, NewQueueItem, QueueMutation, QueuePolicy,
};
use lorikeet_core::{
    DevAddr, DevEui, DeviceStore, HealthStatus, JoinEui, LorikeetError, PluginAdapter,
};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateDevice,
    DeleteDevice,
    ConsumeDevNonce,
    CommitActivation,
    DeleteActivation,
    Enqueue,
    ListQueue,
    FlushQueue,
    ApplyQueueMutation,
}

pub struct FaultyStore {
    inner: Arc<dyn DeviceStore>,
    failing: Mutex<HashSet<StoreOp>>,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn DeviceStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every later call of `op` fail until [`heal`](Self::heal).
    pub async fn fail(&self, op: StoreOp) {
        self.failing.lock().await.insert(op);
    }

    /// Clear all injected failures.
    pub async fn heal(&self) {
        self.failing.lock().await.clear();
    }

    async fn check(&self, op: StoreOp) -> Result<(), LorikeetError> {
        if self.failing.lock().await.contains(&op) {
            tracing::debug!(?op, "injected storage failure");
            return Err(LorikeetError::storage(format!("injected failure in {op:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for FaultyStore {
    fn name(&self) -> &str {
        "faulty"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, LorikeetError> {
        if !self.failing.lock().await.is_empty() {
            return Ok(HealthStatus::Degraded("failures injected".into()));
        }
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), LorikeetError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl DeviceStore for FaultyStore {
    async fn initialize(&self) -> Result<(), LorikeetError> {
        self.inner.initialize().await
    }

    async fn close(&self) -> Result<(), LorikeetError> {
        self.inner.close().await
    }

    async fn create_device(&self, device: &Device) -> Result<(), LorikeetError> {
        self.check(StoreOp::CreateDevice).await?;
        self.inner.create_device(device).await
    }

    async fn get_device(&self, dev_eui: DevEui) -> Result<Option<Device>, LorikeetError> {
        self.inner.get_device(dev_eui).await
    }

    async fn update_device(&self, device: &Device) -> Result<(), LorikeetError> {
        self.inner.update_device(device).await
    }

    async fn delete_device(&self, dev_eui: DevEui) -> Result<bool, LorikeetError> {
        self.check(StoreOp::DeleteDevice).await?;
        self.inner.delete_device(dev_eui).await
    }

    async fn list_devices(&self, query: &DeviceListQuery) -> Result<DevicePage, LorikeetError> {
        self.inner.list_devices(query).await
    }

    async fn mark_device_seen(
        &self,
        dev_eui: DevEui,
        at: DateTime<Utc>,
    ) -> Result<(), LorikeetError> {
        self.inner.mark_device_seen(dev_eui, at).await
    }

    async fn create_keys(&self, keys: &DeviceKeys) -> Result<(), LorikeetError> {
        self.inner.create_keys(keys).await
    }

    async fn get_keys(&self, dev_eui: DevEui) -> Result<Option<DeviceKeys>, LorikeetError> {
        self.inner.get_keys(dev_eui).await
    }

    async fn update_keys(&self, keys: &DeviceKeys) -> Result<(), LorikeetError> {
        self.inner.update_keys(keys).await
    }

    async fn delete_keys(&self, dev_eui: DevEui) -> Result<bool, LorikeetError> {
        self.inner.delete_keys(dev_eui).await
    }

    async fn is_dev_nonce_used(
        &self,
        dev_eui: DevEui,
        join_eui: JoinEui,
        dev_nonce: u16,
    ) -> Result<bool, LorikeetError> {
        self.inner.is_dev_nonce_used(dev_eui, join_eui, dev_nonce).await
    }

    async fn consume_dev_nonce(
        &self,
        dev_eui: DevEui,
        nonce: ConsumedNonce,
    ) -> Result<(), LorikeetError> {
        self.check(StoreOp::ConsumeDevNonce).await?;
        self.inner.consume_dev_nonce(dev_eui, nonce).await
    }

    async fn flush_dev_nonces(&self, dev_eui: DevEui) -> Result<u64, LorikeetError> {
        self.inner.flush_dev_nonces(dev_eui).await
    }

    async fn get_activation(
        &self,
        dev_eui: DevEui,
    ) -> Result<Option<DeviceActivation>, LorikeetError> {
        self.inner.get_activation(dev_eui).await
    }

    async fn commit_activation(&self, commit: &ActivationCommit) -> Result<(), LorikeetError> {
        self.check(StoreOp::CommitActivation).await?;
        self.inner.commit_activation(commit).await
    }

    async fn delete_activation(
        &self,
        dev_eui: DevEui,
        queue_policy: QueuePolicy,
    ) -> Result<bool, LorikeetError> {
        self.check(StoreOp::DeleteActivation).await?;
        self.inner.delete_activation(dev_eui, queue_policy).await
    }

    async fn dev_addr_in_use(
        &self,
        dev_addr: DevAddr,
        exclude: Option<DevEui>,
    ) -> Result<bool, LorikeetError> {
        self.inner.dev_addr_in_use(dev_addr, exclude).await
    }

    async fn enqueue(
        &self,
        dev_eui: DevEui,
        item: &NewQueueItem,
    ) -> Result<EnqueuedItem, LorikeetError> {
        self.check(StoreOp::Enqueue).await?;
        self.inner.enqueue(dev_eui, item).await
    }

    async fn list_queue(&self, dev_eui: DevEui) -> Result<Vec<DeviceQueueItem>, LorikeetError> {
        self.check(StoreOp::ListQueue).await?;
        self.inner.list_queue(dev_eui).await
    }

    async fn flush_queue(&self, dev_eui: DevEui) -> Result<u64, LorikeetError> {
        self.check(StoreOp::FlushQueue).await?;
        self.inner.flush_queue(dev_eui).await
    }

    async fn apply_queue_mutation(
        &self,
        dev_eui: DevEui,
        mutation: &QueueMutation,
    ) -> Result<(), LorikeetError> {
        self.check(StoreOp::ApplyQueueMutation).await?;
        self.inner.apply_queue_mutation(dev_eui, mutation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestHarness;
    use lorikeet_core::ErrorKind;

    #[tokio::test]
    async fn armed_operation_fails_until_healed() {
        let harness = TestHarness::builder().build().await.unwrap();
        let dev_eui: DevEui = "0011223344556677".parse().unwrap();

        harness.store.fail(StoreOp::CreateDevice).await;
        let err = harness.provision(dev_eui).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        assert!(matches!(
            harness.store.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));

        harness.store.heal().await;
        harness.provision(dev_eui).await.unwrap();
        assert_eq!(harness.store.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}

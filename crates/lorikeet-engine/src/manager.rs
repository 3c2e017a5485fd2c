// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composition root of the engine and the [`DeviceService`] implementation.

use std::sync::Arc;

use async_trait::async_trait;
use lorikeet_config::LorikeetConfig;
use lorikeet_core::models::{
    ActivationRequest, Device, DeviceActivation, DeviceKeys, DeviceListQuery, DevicePage,
    DeviceQueueItem, EnqueuedItem, NewQueueItem,
};
use lorikeet_core::{DevAddr, DevEui, DeviceService, EventLogAdapter, LorikeetError};

use crate::activation::ActivationEngine;
use crate::config::EngineConfig;
use crate::events::{EventLog, TracingEventLog};
use crate::keys::KeyManager;
use crate::locks::DeviceLocks;
use crate::nonce::NonceTracker;
use crate::queue::DownlinkQueueManager;
use crate::registry::DeviceRegistry;
use crate::SharedStore;

/// All engine components over one store and one lock map.
#[derive(Clone)]
pub struct DeviceManager {
    store: SharedStore,
    locks: Arc<DeviceLocks>,
    config: EngineConfig,
    registry: DeviceRegistry,
    keys: KeyManager,
    nonces: NonceTracker,
    activation: ActivationEngine,
    queue: DownlinkQueueManager,
}

impl DeviceManager {
    /// Build the engine over an initialized store, logging exchanges via `tracing`.
    pub fn new(store: SharedStore, config: EngineConfig) -> Self {
        Self::with_event_log(store, config, Arc::new(TracingEventLog))
    }

    /// Build the engine with a custom event log backend.
    pub fn with_event_log(
        store: SharedStore,
        config: EngineConfig,
        backend: Arc<dyn EventLogAdapter>,
    ) -> Self {
        let events = EventLog::new(backend);
        let locks = Arc::new(DeviceLocks::new());
        let registry = DeviceRegistry::new(store.clone(), locks.clone());
        let keys = KeyManager::new(store.clone(), locks.clone());
        let nonces = NonceTracker::new(
            store.clone(),
            locks.clone(),
            config.dev_addr_prefixes.clone(),
            config.dev_addr_max_attempts,
        );
        let activation = ActivationEngine::new(
            store.clone(),
            locks.clone(),
            keys.clone(),
            nonces.clone(),
            config.net_id,
            config.flush_queue_on_activate,
            events.clone(),
        );
        let queue = DownlinkQueueManager::new(
            store.clone(),
            locks.clone(),
            config.max_payload_size,
            config.default_ttl,
            events,
        );
        Self {
            store,
            locks,
            config,
            registry,
            keys,
            nonces,
            activation,
            queue,
        }
    }

    pub fn from_config(store: SharedStore, config: &LorikeetConfig) -> Result<Self, LorikeetError> {
        Ok(Self::new(store, EngineConfig::from_config(config)?))
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn keys(&self) -> &KeyManager {
        &self.keys
    }

    pub fn nonces(&self) -> &NonceTracker {
        &self.nonces
    }

    pub fn activation(&self) -> &ActivationEngine {
        &self.activation
    }

    pub fn queue(&self) -> &DownlinkQueueManager {
        &self.queue
    }

    pub fn locks(&self) -> &DeviceLocks {
        &self.locks
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[async_trait]
impl DeviceService for DeviceManager {
    async fn create(&self, device: Device) -> Result<(), LorikeetError> {
        self.registry.create(device).await.map(|_| ())
    }

    async fn get(&self, dev_eui: DevEui) -> Result<Device, LorikeetError> {
        self.registry.get(dev_eui).await
    }

    async fn update(&self, device: Device) -> Result<(), LorikeetError> {
        self.registry.update(device).await.map(|_| ())
    }

    async fn delete(&self, dev_eui: DevEui) -> Result<(), LorikeetError> {
        self.registry.delete(dev_eui).await
    }

    async fn list(&self, query: DeviceListQuery) -> Result<DevicePage, LorikeetError> {
        self.registry.list(&query).await
    }

    async fn create_keys(&self, keys: DeviceKeys) -> Result<(), LorikeetError> {
        self.keys.create_keys(keys).await
    }

    async fn get_keys(&self, dev_eui: DevEui) -> Result<DeviceKeys, LorikeetError> {
        self.keys.get_keys(dev_eui).await
    }

    async fn update_keys(&self, keys: DeviceKeys) -> Result<(), LorikeetError> {
        self.keys.update_keys(keys).await
    }

    async fn delete_keys(&self, dev_eui: DevEui) -> Result<(), LorikeetError> {
        self.keys.delete_keys(dev_eui).await
    }

    async fn flush_dev_nonces(&self, dev_eui: DevEui) -> Result<(), LorikeetError> {
        self.nonces.flush(dev_eui).await.map(|_| ())
    }

    async fn activate(
        &self,
        dev_eui: DevEui,
        request: ActivationRequest,
    ) -> Result<(), LorikeetError> {
        self.activation.activate(dev_eui, request).await.map(|_| ())
    }

    async fn deactivate(&self, dev_eui: DevEui) -> Result<(), LorikeetError> {
        self.activation.deactivate(dev_eui).await
    }

    async fn get_activation(&self, dev_eui: DevEui) -> Result<DeviceActivation, LorikeetError> {
        self.activation.get_activation(dev_eui).await
    }

    async fn get_random_dev_addr(&self, dev_eui: DevEui) -> Result<DevAddr, LorikeetError> {
        self.activation.get_random_dev_addr(dev_eui).await
    }

    async fn enqueue(
        &self,
        dev_eui: DevEui,
        item: NewQueueItem,
    ) -> Result<EnqueuedItem, LorikeetError> {
        self.queue.enqueue(dev_eui, item).await
    }

    async fn flush_queue(&self, dev_eui: DevEui) -> Result<(), LorikeetError> {
        self.queue.flush_queue(dev_eui).await.map(|_| ())
    }

    async fn get_queue(&self, dev_eui: DevEui) -> Result<Vec<DeviceQueueItem>, LorikeetError> {
        self.queue.get_queue(dev_eui).await
    }
}

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end tests.
//!
//! `TestHarness` opens a SQLite database in a temporary directory, wraps it
//! in a [`FaultyStore`], and builds a [`DeviceManager`] over it that records
//! its event log in a [`RecordingEventLog`].

use std::sync::Arc;

use lorikeet_config::LorikeetConfig;
use lorikeet_config::model::StorageConfig;
use lorikeet_core::models::{
    ActivationRequest, Device, DeviceActivation, DeviceKeys, NewQueueItem, OtaaActivation,
};
use lorikeet_core::{AesKey, DevEui, DeviceStore, JoinEui, LorikeetError, MacVersion};
use lorikeet_engine::{DeviceManager, EngineConfig};
use lorikeet_storage::SqliteStorage;

use crate::event_log::RecordingEventLog;
use crate::faulty_store::FaultyStore;

/// JoinEUI used by [`TestHarness::join`].
pub const TEST_JOIN_EUI: JoinEui = JoinEui::from_be_bytes([0x70, 0xb3, 0xd5, 0x7e, 0xd0, 0, 0, 0]);

/// Builder for a test environment.
pub struct TestHarnessBuilder {
    config: LorikeetConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: LorikeetConfig::default(),
        }
    }

    /// Flush the downlink queue when a session is installed or removed.
    pub fn with_flush_on_activate(mut self, flush: bool) -> Self {
        self.config.activation.flush_queue_on_activate = flush;
        self
    }

    pub fn with_net_id(mut self, net_id: &str) -> Self {
        self.config.network.net_id = net_id.to_string();
        self
    }

    pub fn with_dev_addr_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.config.network.dev_addr_prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_dev_addr_max_attempts(mut self, attempts: u32) -> Self {
        self.config.activation.dev_addr_max_attempts = attempts;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.config.queue.max_payload_size = size;
        self
    }

    pub fn with_default_ttl_secs(mut self, secs: u64) -> Self {
        self.config.queue.default_ttl_secs = Some(secs);
        self
    }

    /// Build the harness, creating and migrating the database.
    pub async fn build(mut self) -> Result<TestHarness, LorikeetError> {
        let temp_dir = tempfile::TempDir::new().map_err(LorikeetError::storage)?;
        let db_path = temp_dir.path().join("test.db");

        self.config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
            busy_timeout_ms: 5000,
        };
        let storage = SqliteStorage::new(self.config.storage.clone());
        storage.initialize().await?;

        let store = Arc::new(FaultyStore::new(Arc::new(storage)));
        let events = Arc::new(RecordingEventLog::new());
        let manager = DeviceManager::with_event_log(
            store.clone(),
            EngineConfig::from_config(&self.config)?,
            events.clone(),
        );

        Ok(TestHarness {
            manager,
            store,
            events,
            config: self.config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete engine over a temporary database.
pub struct TestHarness {
    /// The engine under test.
    pub manager: DeviceManager,
    /// The store behind the engine, for fault injection and direct reads.
    pub store: Arc<FaultyStore>,
    /// Every event log entry the engine published.
    pub events: Arc<RecordingEventLog>,
    /// Configuration the engine was built from.
    pub config: LorikeetConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Register a device with fixed, non-zero root keys.
    pub async fn provision(&self, dev_eui: DevEui) -> Result<Device, LorikeetError> {
        let device = self
            .manager
            .registry()
            .create(Device::new(dev_eui, format!("test-{dev_eui}"), "test-profile"))
            .await?;
        self.manager
            .keys()
            .create_keys(DeviceKeys::new(
                dev_eui,
                AesKey::from_bytes([0x2b; 16]),
                AesKey::from_bytes([0x7e; 16]),
            ))
            .await?;
        Ok(device)
    }

    /// OTAA-activate with [`TEST_JOIN_EUI`] and a LoRaWAN 1.0.3 session.
    pub async fn join(
        &self,
        dev_eui: DevEui,
        dev_nonce: u16,
    ) -> Result<DeviceActivation, LorikeetError> {
        self.manager
            .activation()
            .activate(
                dev_eui,
                ActivationRequest::Otaa(OtaaActivation {
                    join_eui: TEST_JOIN_EUI,
                    dev_nonce,
                    join_nonce: None,
                    mac_version: MacVersion::LoRaWAN1_0_3,
                    dev_addr: None,
                    counters: None,
                }),
            )
            .await
    }

    /// Enqueue a payload on FPort 1.
    pub async fn push(
        &self,
        dev_eui: DevEui,
        data: &[u8],
        confirmed: bool,
    ) -> Result<(), LorikeetError> {
        self.manager
            .queue()
            .enqueue(
                dev_eui,
                NewQueueItem {
                    f_port: 1,
                    data: data.to_vec(),
                    confirmed,
                    expires_at: None,
                },
            )
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_applies_settings() {
        let harness = TestHarness::builder()
            .with_flush_on_activate(true)
            .with_dev_addr_prefixes(&["26000000/8"])
            .with_max_payload_size(51)
            .build()
            .await
            .unwrap();
        let engine = harness.manager.config();
        assert!(engine.flush_queue_on_activate);
        assert_eq!(engine.max_payload_size, 51);
        assert_eq!(engine.dev_addr_prefixes[0].to_string(), "26000000/8");
        assert!(harness.config.storage.database_path.ends_with("test.db"));
    }

    #[tokio::test]
    async fn provision_and_join() {
        let harness = TestHarness::builder().build().await.unwrap();
        let dev_eui: DevEui = "0011223344556677".parse().unwrap();
        harness.provision(dev_eui).await.unwrap();
        let session = harness.join(dev_eui, 1).await.unwrap();
        assert_eq!(session.join_eui, Some(TEST_JOIN_EUI));
        harness.push(dev_eui, b"hi", false).await.unwrap();
        assert_eq!(harness.store.list_queue(dev_eui).await.unwrap().len(), 1);
    }
}

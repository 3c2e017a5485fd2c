// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the DeviceStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use lorikeet_config::model::StorageConfig;
use lorikeet_core::models::{
    ActivationCommit, ConsumedNonce, Device, DeviceActivation, DeviceKeys, DeviceListQuery,
    DevicePage, DeviceQueueItem, EnqueuedItem, NewQueueItem, QueueMutation, QueuePolicy,
};
use lorikeet_core::{
    DevAddr, DevEui, DeviceStore, HealthStatus, JoinEui, LorikeetError, PluginAdapter,
};

use crate::database::{Database, QueryError, map_tr_err};
use crate::queries;

/// SQLite-backed device store.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened by [`DeviceStore::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a store for the configured path. Nothing is opened yet.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns the underlying Database, or an error if not initialized.
    pub fn db(&self) -> Result<&Database, LorikeetError> {
        self.db
            .get()
            .ok_or_else(|| LorikeetError::storage("storage not initialized -- call initialize() first"))
    }

    async fn checkpoint(&self, db: &Database) -> Result<(), LorikeetError> {
        db.connection()
            .call(|conn| -> Result<(), QueryError> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, LorikeetError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), QueryError> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LorikeetError> {
        if let Some(db) = self.db.get() {
            self.checkpoint(db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceStore for SqliteStorage {
    async fn initialize(&self) -> Result<(), LorikeetError> {
        let db = Database::open_with_config(&self.config).await?;
        self.db
            .set(db)
            .map_err(|_| LorikeetError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), LorikeetError> {
        let db = self.db()?;
        self.checkpoint(db).await
    }

    // --- Devices ---

    async fn create_device(&self, device: &Device) -> Result<(), LorikeetError> {
        queries::devices::create_device(self.db()?, device).await
    }

    async fn get_device(&self, dev_eui: DevEui) -> Result<Option<Device>, LorikeetError> {
        queries::devices::get_device(self.db()?, dev_eui).await
    }

    async fn update_device(&self, device: &Device) -> Result<(), LorikeetError> {
        queries::devices::update_device(self.db()?, device).await
    }

    async fn delete_device(&self, dev_eui: DevEui) -> Result<bool, LorikeetError> {
        queries::devices::delete_device(self.db()?, dev_eui).await
    }

    async fn list_devices(&self, query: &DeviceListQuery) -> Result<DevicePage, LorikeetError> {
        queries::devices::list_devices(self.db()?, query).await
    }

    async fn mark_device_seen(
        &self,
        dev_eui: DevEui,
        at: DateTime<Utc>,
    ) -> Result<(), LorikeetError> {
        queries::devices::mark_device_seen(self.db()?, dev_eui, at).await
    }

    // --- Keys ---

    async fn create_keys(&self, keys: &DeviceKeys) -> Result<(), LorikeetError> {
        queries::keys::create_keys(self.db()?, keys).await
    }

    async fn get_keys(&self, dev_eui: DevEui) -> Result<Option<DeviceKeys>, LorikeetError> {
        queries::keys::get_keys(self.db()?, dev_eui).await
    }

    async fn update_keys(&self, keys: &DeviceKeys) -> Result<(), LorikeetError> {
        queries::keys::update_keys(self.db()?, keys).await
    }

    async fn delete_keys(&self, dev_eui: DevEui) -> Result<bool, LorikeetError> {
        queries::keys::delete_keys(self.db()?, dev_eui).await
    }

    // --- DevNonce history ---

    async fn is_dev_nonce_used(
        &self,
        dev_eui: DevEui,
        join_eui: JoinEui,
        dev_nonce: u16,
    ) -> Result<bool, LorikeetError> {
        queries::nonces::is_dev_nonce_used(self.db()?, dev_eui, join_eui, dev_nonce).await
    }

    async fn consume_dev_nonce(
        &self,
        dev_eui: DevEui,
        nonce: ConsumedNonce,
    ) -> Result<(), LorikeetError> {
        queries::nonces::consume_dev_nonce(self.db()?, dev_eui, nonce).await
    }

    async fn flush_dev_nonces(&self, dev_eui: DevEui) -> Result<u64, LorikeetError> {
        queries::nonces::flush_dev_nonces(self.db()?, dev_eui).await
    }

    // --- Activation ---

    async fn get_activation(
        &self,
        dev_eui: DevEui,
    ) -> Result<Option<DeviceActivation>, LorikeetError> {
        queries::activations::get_activation(self.db()?, dev_eui).await
    }

    async fn commit_activation(&self, commit: &ActivationCommit) -> Result<(), LorikeetError> {
        queries::activations::commit_activation(self.db()?, commit).await
    }

    async fn delete_activation(
        &self,
        dev_eui: DevEui,
        queue_policy: QueuePolicy,
    ) -> Result<bool, LorikeetError> {
        queries::activations::delete_activation(self.db()?, dev_eui, queue_policy).await
    }

    async fn dev_addr_in_use(
        &self,
        dev_addr: DevAddr,
        exclude: Option<DevEui>,
    ) -> Result<bool, LorikeetError> {
        queries::activations::dev_addr_in_use(self.db()?, dev_addr, exclude).await
    }

    // --- Downlink queue ---

    async fn enqueue(
        &self,
        dev_eui: DevEui,
        item: &NewQueueItem,
    ) -> Result<EnqueuedItem, LorikeetError> {
        queries::queue::enqueue(self.db()?, dev_eui, item).await
    }

    async fn list_queue(&self, dev_eui: DevEui) -> Result<Vec<DeviceQueueItem>, LorikeetError> {
        queries::queue::list_queue(self.db()?, dev_eui).await
    }

    async fn flush_queue(&self, dev_eui: DevEui) -> Result<u64, LorikeetError> {
        queries::queue::flush_queue(self.db()?, dev_eui).await
    }

    async fn apply_queue_mutation(
        &self,
        dev_eui: DevEui,
        mutation: &QueueMutation,
    ) -> Result<(), LorikeetError> {
        queries::queue::apply_queue_mutation(self.db()?, dev_eui, mutation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorikeet_core::models::Device;
    use lorikeet_core::{AesKey, ErrorKind};
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
            busy_timeout_ms: 1000,
        }
    }

    #[tokio::test]
    async fn identifies_as_sqlite_adapter() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("a.db").to_str().unwrap()));
        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("b.db").to_str().unwrap()));
        assert!(storage.health_check().await.is_err());
        let err = storage.get_device(DevEui::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageUnavailable);
        // Shutdown of a never-opened store is a no-op.
        storage.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(dir.path().join("c.db").to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn device_lifecycle_through_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert!(db_path.exists());
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);

        let dev_eui: DevEui = "0011223344556677".parse().unwrap();
        storage
            .create_device(&Device::new(dev_eui, "d1", "profile"))
            .await
            .unwrap();
        storage
            .create_keys(&DeviceKeys::new(
                dev_eui,
                AesKey::from_bytes([1; 16]),
                AesKey::from_bytes([2; 16]),
            ))
            .await
            .unwrap();
        storage
            .enqueue(
                dev_eui,
                &NewQueueItem {
                    f_port: 1,
                    data: vec![1, 2, 3],
                    confirmed: false,
                    expires_at: None,
                },
            )
            .await
            .unwrap();

        assert!(storage.delete_device(dev_eui).await.unwrap());
        assert!(storage.get_keys(dev_eui).await.unwrap().is_none());
        assert!(storage.list_queue(dev_eui).await.unwrap().is_empty());

        storage.close().await.unwrap();
        storage.shutdown().await.unwrap();
    }
}

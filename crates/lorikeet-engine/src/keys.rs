// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Root key management and session key derivation.

use std::sync::Arc;

use chrono::Utc;
use lorikeet_core::models::{DeviceKeys, SessionKeys};
use lorikeet_core::{ActivationMode, DevEui, LorikeetError};
use lorikeet_crypto::{JoinParams, derive_session_keys};
use tracing::{debug, info};

use crate::SharedStore;
use crate::locks::DeviceLocks;

fn keys_not_found(dev_eui: DevEui) -> LorikeetError {
    LorikeetError::NotFound {
        entity: "device keys",
        key: dev_eui.to_string(),
    }
}

/// Owner of the per-device root keys.
#[derive(Clone)]
pub struct KeyManager {
    store: SharedStore,
    locks: Arc<DeviceLocks>,
}

impl KeyManager {
    pub fn new(store: SharedStore, locks: Arc<DeviceLocks>) -> Self {
        Self { store, locks }
    }

    /// Derive the session keys of a join exchange.
    pub fn derive_session(
        &self,
        keys: &DeviceKeys,
        params: &JoinParams,
    ) -> Result<SessionKeys, LorikeetError> {
        derive_session_keys(keys, params)
    }

    /// Store root keys for an existing device. The JoinNonce counter starts
    /// at the supplied value.
    pub async fn create_keys(&self, mut keys: DeviceKeys) -> Result<(), LorikeetError> {
        validate_root_keys(&keys)?;
        let now = Utc::now();
        keys.created_at = now;
        keys.updated_at = now;
        self.store.create_keys(&keys).await?;
        info!(dev_eui = %keys.dev_eui, "device keys created");
        Ok(())
    }

    pub async fn get_keys(&self, dev_eui: DevEui) -> Result<DeviceKeys, LorikeetError> {
        self.store
            .get_keys(dev_eui)
            .await?
            .ok_or_else(|| keys_not_found(dev_eui))
    }

    /// Replace the root keys.
    ///
    /// The JoinNonce counter is owned by the activation path and is never
    /// rewound here. Rejected while a LoRaWAN 1.0.x OTAA session derived from
    /// the current keys is active.
    pub async fn update_keys(&self, mut keys: DeviceKeys) -> Result<(), LorikeetError> {
        validate_root_keys(&keys)?;
        let dev_eui = keys.dev_eui;
        let _guard = self.locks.lock(dev_eui).await;

        let existing = self.get_keys(dev_eui).await?;
        if let Some(session) = self.store.get_activation(dev_eui).await?
            && session.mode == ActivationMode::Otaa
            && !session.mac_version.is_1_1()
        {
            return Err(LorikeetError::InvalidParameters(format!(
                "keys of device {dev_eui} are in use by an active LoRaWAN {} session; deactivate first",
                session.mac_version
            )));
        }

        keys.join_nonce = existing.join_nonce;
        keys.created_at = existing.created_at;
        keys.updated_at = Utc::now();
        self.store.update_keys(&keys).await?;
        info!(dev_eui = %dev_eui, "device keys updated");
        Ok(())
    }

    /// Remove the root keys. A live session keeps its derived keys.
    pub async fn delete_keys(&self, dev_eui: DevEui) -> Result<(), LorikeetError> {
        let _guard = self.locks.lock(dev_eui).await;
        if !self.store.delete_keys(dev_eui).await? {
            return Err(keys_not_found(dev_eui));
        }
        info!(dev_eui = %dev_eui, "device keys deleted");
        Ok(())
    }

    /// Root keys for an activation. Missing keys are reported as unusable key
    /// material rather than a missing record.
    pub(crate) async fn keys_for_join(&self, dev_eui: DevEui) -> Result<DeviceKeys, LorikeetError> {
        let keys = self.store.get_keys(dev_eui).await?.ok_or_else(|| {
            LorikeetError::InvalidKeyMaterial(format!("device {dev_eui} has no root keys"))
        })?;
        debug!(dev_eui = %dev_eui, join_nonce = keys.join_nonce, "loaded root keys");
        Ok(keys)
    }
}

fn validate_root_keys(keys: &DeviceKeys) -> Result<(), LorikeetError> {
    if keys.nwk_key.is_zero() {
        return Err(LorikeetError::InvalidKeyMaterial(
            "nwk_key must not be all zeros".into(),
        ));
    }
    if keys.join_nonce > lorikeet_crypto::MAX_JOIN_NONCE {
        return Err(LorikeetError::InvalidParameters(format!(
            "join_nonce {} exceeds 24 bits",
            keys.join_nonce
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{D1, eui, join_eui, manager, otaa, otaa_with, provision};
    use lorikeet_core::models::Device;
    use lorikeet_core::{AesKey, ErrorKind, MacVersion, NetId};

    fn keys(dev_eui: DevEui, byte: u8) -> DeviceKeys {
        DeviceKeys::new(
            dev_eui,
            AesKey::from_bytes([byte; 16]),
            AesKey::from_bytes([byte ^ 0xff; 16]),
        )
    }

    #[tokio::test]
    async fn crud_requires_device() {
        let (manager, _dir) = manager().await;
        let err = manager.keys().create_keys(keys(eui(D1), 1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        manager
            .registry()
            .create(Device::new(eui(D1), "d1", "p"))
            .await
            .unwrap();
        manager.keys().create_keys(keys(eui(D1), 1)).await.unwrap();
        let err = manager.keys().create_keys(keys(eui(D1), 2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        manager.keys().update_keys(keys(eui(D1), 3)).await.unwrap();
        let stored = manager.keys().get_keys(eui(D1)).await.unwrap();
        assert_eq!(stored.nwk_key, AesKey::from_bytes([3; 16]));

        manager.keys().delete_keys(eui(D1)).await.unwrap();
        assert_eq!(
            manager.keys().get_keys(eui(D1)).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            manager.keys().delete_keys(eui(D1)).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn zero_root_key_is_invalid_key_material() {
        let (manager, _dir) = manager().await;
        manager
            .registry()
            .create(Device::new(eui(D1), "d1", "p"))
            .await
            .unwrap();
        let err = manager
            .keys()
            .create_keys(DeviceKeys::new(eui(D1), AesKey::default(), AesKey::default()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeyMaterial);
    }

    #[tokio::test]
    async fn update_keeps_join_nonce_counter() {
        let (manager, _dir) = manager().await;
        provision(&manager, eui(D1)).await;
        manager
            .activation()
            .activate(eui(D1), otaa_with(1, MacVersion::LoRaWAN1_1_0))
            .await
            .unwrap();
        assert_eq!(manager.keys().get_keys(eui(D1)).await.unwrap().join_nonce, 1);

        // 1.1 sessions do not pin the root keys.
        let mut replacement = keys(eui(D1), 9);
        replacement.join_nonce = 0;
        manager.keys().update_keys(replacement).await.unwrap();
        assert_eq!(manager.keys().get_keys(eui(D1)).await.unwrap().join_nonce, 1);
    }

    #[tokio::test]
    async fn update_rejected_during_1_0_otaa_session() {
        let (manager, _dir) = manager().await;
        provision(&manager, eui(D1)).await;
        manager.activation().activate(eui(D1), otaa(1)).await.unwrap();

        let err = manager.keys().update_keys(keys(eui(D1), 5)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);

        manager.activation().deactivate(eui(D1)).await.unwrap();
        manager.keys().update_keys(keys(eui(D1), 5)).await.unwrap();
    }

    #[tokio::test]
    async fn delete_keys_leaves_session() {
        let (manager, _dir) = manager().await;
        provision(&manager, eui(D1)).await;
        let session = manager.activation().activate(eui(D1), otaa(1)).await.unwrap();

        manager.keys().delete_keys(eui(D1)).await.unwrap();
        let still = manager.activation().get_activation(eui(D1)).await.unwrap();
        assert_eq!(still.keys, session.keys);

        // New joins need root keys again.
        let err = manager
            .activation()
            .activate(eui(D1), otaa(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKeyMaterial);
    }

    #[tokio::test]
    async fn derive_session_is_deterministic() {
        let (manager, _dir) = manager().await;
        let root = keys(eui(D1), 0x42);
        let params = JoinParams {
            mac_version: MacVersion::LoRaWAN1_0_2,
            join_nonce: 7,
            dev_nonce: 99,
            net_id: NetId::default(),
            join_eui: join_eui(),
        };
        let a = manager.keys().derive_session(&root, &params).unwrap();
        let b = manager.keys().derive_session(&root, &params).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.f_nwk_s_int_key, a.nwk_s_enc_key);
        assert_ne!(a.app_s_key, a.nwk_s_enc_key);

        let bumped = JoinParams {
            join_nonce: 8,
            ..params
        };
        assert_ne!(manager.keys().derive_session(&root, &bumped).unwrap(), a);
    }
}

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Join-request replay protection and DevAddr allocation.
//!
//! Consumed DevNonces are kept per (DevEUI, JoinEUI) until the history is
//! flushed or the device is deleted. There is no age-based pruning.

use std::sync::Arc;

use lorikeet_core::models::ConsumedNonce;
use lorikeet_core::{DevAddr, DevAddrPrefix, DevEui, JoinEui, LorikeetError};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::SharedStore;
use crate::locks::DeviceLocks;

#[derive(Clone)]
pub struct NonceTracker {
    store: SharedStore,
    locks: Arc<DeviceLocks>,
    prefixes: Arc<[DevAddrPrefix]>,
    max_attempts: u32,
}

impl NonceTracker {
    pub fn new(
        store: SharedStore,
        locks: Arc<DeviceLocks>,
        prefixes: Vec<DevAddrPrefix>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            locks,
            prefixes: prefixes.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Reject a replayed DevNonce, otherwise record it durably.
    ///
    /// Devices flagged with `skip_nonce_validation` accept any nonce; the
    /// nonce is still recorded.
    pub async fn validate_and_consume(
        &self,
        dev_eui: DevEui,
        join_eui: JoinEui,
        dev_nonce: u16,
    ) -> Result<(), LorikeetError> {
        let _guard = self.locks.lock(dev_eui).await;
        let device = self
            .store
            .get_device(dev_eui)
            .await?
            .ok_or_else(|| LorikeetError::device_not_found(dev_eui))?;

        let nonce = ConsumedNonce {
            join_eui,
            dev_nonce,
            allow_reuse: device.skip_nonce_validation,
        };
        if let Err(e) = self.store.consume_dev_nonce(dev_eui, nonce).await {
            if matches!(e, LorikeetError::ReplayDetected { .. }) {
                warn!(dev_eui = %dev_eui, join_eui = %join_eui, dev_nonce, "dev_nonce replay rejected");
            }
            return Err(e);
        }
        debug!(dev_eui = %dev_eui, join_eui = %join_eui, dev_nonce, "dev_nonce consumed");
        Ok(())
    }

    /// True if the nonce has already been consumed.
    pub async fn is_consumed(
        &self,
        dev_eui: DevEui,
        join_eui: JoinEui,
        dev_nonce: u16,
    ) -> Result<bool, LorikeetError> {
        self.store
            .is_dev_nonce_used(dev_eui, join_eui, dev_nonce)
            .await
    }

    /// Forget every consumed nonce of the device. The session is untouched.
    pub async fn flush(&self, dev_eui: DevEui) -> Result<u64, LorikeetError> {
        let _guard = self.locks.lock(dev_eui).await;
        if self.store.get_device(dev_eui).await?.is_none() {
            return Err(LorikeetError::device_not_found(dev_eui));
        }
        let removed = self.store.flush_dev_nonces(dev_eui).await?;
        info!(dev_eui = %dev_eui, removed, "dev_nonce history flushed");
        Ok(removed)
    }

    /// True if no session of a device other than `exclude` holds `dev_addr`.
    pub async fn dev_addr_available(
        &self,
        dev_addr: DevAddr,
        exclude: Option<DevEui>,
    ) -> Result<bool, LorikeetError> {
        Ok(!self.store.dev_addr_in_use(dev_addr, exclude).await?)
    }

    /// Draw a random DevAddr from the configured prefixes that no other
    /// device's session holds.
    ///
    /// Fails with `AddressSpaceExhausted` after the configured number of
    /// colliding candidates.
    pub async fn next_dev_addr(&self, exclude: Option<DevEui>) -> Result<DevAddr, LorikeetError> {
        for attempt in 1..=self.max_attempts {
            let candidate = {
                let mut rng = rand::thread_rng();
                let prefix = self.prefixes.choose(&mut rng).ok_or_else(|| {
                    LorikeetError::Config("no DevAddr prefix configured".into())
                })?;
                prefix.random_dev_addr(&mut rng)
            };
            if self.dev_addr_available(candidate, exclude).await? {
                debug!(dev_addr = %candidate, attempt, "allocated dev_addr");
                return Ok(candidate);
            }
            debug!(dev_addr = %candidate, attempt, "dev_addr collision");
        }
        warn!(attempts = self.max_attempts, "dev_addr space exhausted");
        Err(LorikeetError::AddressSpaceExhausted {
            attempts: self.max_attempts,
        })
    }

    pub fn prefixes(&self) -> &[DevAddrPrefix] {
        &self.prefixes
    }

    /// Candidate draws allowed before giving up on an address.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

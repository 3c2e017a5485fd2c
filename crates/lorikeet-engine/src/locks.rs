// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-device exclusive access.
//!
//! Every mutating operation on a device's session, nonce history, or queue
//! holds that device's mutex for its whole read-plan-write cycle. The map is
//! sharded, so devices never contend with each other.

use std::sync::Arc;

use dashmap::DashMap;
use lorikeet_core::DevEui;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<DevEui, Arc<Mutex<()>>>;

/// Guard proving exclusive access to one device.
///
/// Dropping the last guard of a device with no waiters removes the device's
/// entry, so the map only holds devices that are in use.
pub struct DeviceGuard {
    dev_eui: DevEui,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        // Release first so the map entry is the only remaining reference.
        drop(self.guard.take());
        self.locks
            .remove_if(&self.dev_eui, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[derive(Debug, Default)]
pub struct DeviceLocks {
    locks: Arc<LockMap>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `dev_eui`.
    pub async fn lock(&self, dev_eui: DevEui) -> DeviceGuard {
        let mutex = self
            .locks
            .entry(dev_eui)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        DeviceGuard {
            dev_eui,
            locks: self.locks.clone(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    /// Number of devices that are locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

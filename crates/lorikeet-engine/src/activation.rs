// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle: `Unactivated -> Active -> Unactivated`.
//!
//! Activating an active device replaces its session in the same store
//! transaction that records the join nonce and bumps the JoinNonce counter,
//! so there is never a moment with zero or two sessions.

use std::sync::Arc;

use chrono::Utc;
use lorikeet_core::models::{
    AbpActivation, ActivationCommit, ActivationRequest, ConsumedNonce, Device, DeviceActivation,
    EventKind, FrameStatusResult, LogEntry, OtaaActivation, QueuePolicy, SessionKeys,
};
use lorikeet_core::{ActivationMode, DevAddr, DevEui, ErrorKind, LorikeetError, NetId};
use lorikeet_crypto::{JoinParams, MAX_JOIN_NONCE};
use tracing::{debug, info, warn};

use crate::SharedStore;
use crate::events::EventLog;
use crate::keys::KeyManager;
use crate::locks::DeviceLocks;
use crate::nonce::NonceTracker;

#[derive(Clone)]
pub struct ActivationEngine {
    store: SharedStore,
    locks: Arc<DeviceLocks>,
    keys: KeyManager,
    nonces: NonceTracker,
    net_id: NetId,
    queue_policy: QueuePolicy,
    events: EventLog,
}

impl ActivationEngine {
    pub fn new(
        store: SharedStore,
        locks: Arc<DeviceLocks>,
        keys: KeyManager,
        nonces: NonceTracker,
        net_id: NetId,
        flush_queue_on_activate: bool,
        events: EventLog,
    ) -> Self {
        let queue_policy = if flush_queue_on_activate {
            QueuePolicy::Flush
        } else {
            QueuePolicy::Requeue
        };
        Self {
            store,
            locks,
            keys,
            nonces,
            net_id,
            queue_policy,
            events,
        }
    }

    /// What happens to queued downlinks when a session is replaced or removed.
    pub fn queue_policy(&self) -> QueuePolicy {
        self.queue_policy
    }

    /// Install a new session, replacing the current one.
    ///
    /// Every OTAA attempt, accepted or not, is written to the event log.
    pub async fn activate(
        &self,
        dev_eui: DevEui,
        request: ActivationRequest,
    ) -> Result<DeviceActivation, LorikeetError> {
        let join_nonce = match &request {
            ActivationRequest::Otaa(otaa) => Some(otaa.dev_nonce),
            ActivationRequest::Abp(_) => None,
        };
        let _guard = self.locks.lock(dev_eui).await;
        let result = self.activate_locked(dev_eui, request).await;

        if let Some(dev_nonce) = join_nonce {
            let entry = LogEntry::new(EventKind::Join, dev_eui).dev_nonce(dev_nonce);
            let entry = match &result {
                Ok(activation) => entry.dev_addr(activation.dev_addr),
                Err(e) if e.kind() == ErrorKind::NotFound => entry
                    .unknown_device()
                    .status(FrameStatusResult::Nok, e.to_string()),
                Err(e) => entry.status(FrameStatusResult::Nok, e.to_string()),
            };
            self.events.send(entry).await;
        }
        result
    }

    async fn activate_locked(
        &self,
        dev_eui: DevEui,
        request: ActivationRequest,
    ) -> Result<DeviceActivation, LorikeetError> {
        let device = self
            .store
            .get_device(dev_eui)
            .await?
            .ok_or_else(|| LorikeetError::device_not_found(dev_eui))?;

        // A server-chosen address may be taken by another device's join
        // between the draw and the commit; such joins draw again.
        let redraw = matches!(&request, ActivationRequest::Otaa(otaa) if otaa.dev_addr.is_none());
        let mut commit = match request {
            ActivationRequest::Otaa(otaa) => self.plan_otaa(&device, otaa).await?,
            ActivationRequest::Abp(abp) => self.plan_abp(&device, abp).await?,
        };

        let mut attempt = 1;
        loop {
            match self.store.commit_activation(&commit).await {
                Ok(()) => break,
                Err(LorikeetError::AddressConflict { dev_addr }) if redraw => {
                    if attempt >= self.nonces.max_attempts() {
                        warn!(dev_eui = %dev_eui, attempts = attempt, "dev_addr space exhausted");
                        return Err(LorikeetError::AddressSpaceExhausted { attempts: attempt });
                    }
                    attempt += 1;
                    debug!(dev_eui = %dev_eui, dev_addr = %dev_addr, attempt, "dev_addr claimed concurrently, redrawing");
                    commit.activation.dev_addr = self.nonces.next_dev_addr(Some(dev_eui)).await?;
                }
                Err(e) => {
                    match &e {
                        LorikeetError::ReplayDetected { dev_nonce, .. } => {
                            warn!(dev_eui = %dev_eui, dev_nonce, "activation rejected: dev_nonce replay");
                        }
                        LorikeetError::AddressConflict { dev_addr } => {
                            warn!(dev_eui = %dev_eui, dev_addr = %dev_addr, "activation rejected: dev_addr conflict");
                        }
                        _ => {}
                    }
                    return Err(e);
                }
            }
        }

        let activation = commit.activation;
        info!(
            dev_eui = %dev_eui,
            dev_addr = %activation.dev_addr,
            mode = %activation.mode,
            mac_version = %activation.mac_version,
            "device activated"
        );
        Ok(activation)
    }

    async fn plan_otaa(
        &self,
        device: &Device,
        otaa: OtaaActivation,
    ) -> Result<ActivationCommit, LorikeetError> {
        let dev_eui = device.dev_eui;
        if let Some(bound) = device.join_eui
            && bound != otaa.join_eui
        {
            return Err(LorikeetError::InvalidParameters(format!(
                "device {dev_eui} is bound to join_eui {bound}, got {}",
                otaa.join_eui
            )));
        }

        let keys = self.keys.keys_for_join(dev_eui).await?;

        if !device.skip_nonce_validation
            && self
                .nonces
                .is_consumed(dev_eui, otaa.join_eui, otaa.dev_nonce)
                .await?
        {
            warn!(dev_eui = %dev_eui, dev_nonce = otaa.dev_nonce, "activation rejected: dev_nonce replay");
            return Err(LorikeetError::ReplayDetected {
                dev_eui,
                join_eui: otaa.join_eui,
                dev_nonce: otaa.dev_nonce,
            });
        }

        let join_nonce = match otaa.join_nonce {
            Some(requested) => {
                if otaa.mac_version.is_1_1() && requested <= keys.join_nonce {
                    return Err(LorikeetError::InvalidParameters(format!(
                        "join_nonce {requested} must be greater than the last issued join_nonce {}",
                        keys.join_nonce
                    )));
                }
                requested
            }
            None => keys.join_nonce.saturating_add(1),
        };
        if join_nonce > MAX_JOIN_NONCE {
            return Err(LorikeetError::InvalidParameters(format!(
                "join_nonce {join_nonce} exceeds 24 bits"
            )));
        }

        let session_keys = self.keys.derive_session(
            &keys,
            &JoinParams {
                mac_version: otaa.mac_version,
                join_nonce,
                dev_nonce: otaa.dev_nonce,
                net_id: self.net_id,
                join_eui: otaa.join_eui,
            },
        )?;

        let dev_addr = match otaa.dev_addr {
            Some(dev_addr) => {
                self.ensure_dev_addr_free(dev_eui, dev_addr).await?;
                dev_addr
            }
            None => self.nonces.next_dev_addr(Some(dev_eui)).await?,
        };

        let counters = otaa.counters.unwrap_or_default();
        debug!(dev_eui = %dev_eui, join_nonce, dev_addr = %dev_addr, "planned otaa session");
        Ok(ActivationCommit {
            activation: DeviceActivation {
                dev_eui,
                dev_addr,
                mode: ActivationMode::Otaa,
                mac_version: otaa.mac_version,
                join_eui: Some(otaa.join_eui),
                dev_nonce: Some(otaa.dev_nonce),
                join_nonce: Some(join_nonce),
                keys: session_keys,
                f_cnt_up: counters.f_cnt_up,
                n_f_cnt_down: counters.n_f_cnt_down,
                a_f_cnt_down: counters.a_f_cnt_down,
                last_acked_f_cnt_down: None,
                activated_at: Utc::now(),
            },
            consumed_nonce: Some(ConsumedNonce {
                join_eui: otaa.join_eui,
                dev_nonce: otaa.dev_nonce,
                allow_reuse: device.skip_nonce_validation,
            }),
            join_nonce: Some(join_nonce.max(keys.join_nonce)),
            queue_policy: self.queue_policy,
        })
    }

    async fn plan_abp(
        &self,
        device: &Device,
        abp: AbpActivation,
    ) -> Result<ActivationCommit, LorikeetError> {
        let dev_eui = device.dev_eui;
        let session_keys = abp_session_keys(&abp)?;
        self.ensure_dev_addr_free(dev_eui, abp.dev_addr).await?;

        Ok(ActivationCommit {
            activation: DeviceActivation {
                dev_eui,
                dev_addr: abp.dev_addr,
                mode: ActivationMode::Abp,
                mac_version: abp.mac_version,
                join_eui: None,
                dev_nonce: None,
                join_nonce: None,
                keys: session_keys,
                f_cnt_up: abp.counters.f_cnt_up,
                n_f_cnt_down: abp.counters.n_f_cnt_down,
                a_f_cnt_down: abp.counters.a_f_cnt_down,
                last_acked_f_cnt_down: None,
                activated_at: Utc::now(),
            },
            consumed_nonce: None,
            join_nonce: None,
            queue_policy: self.queue_policy,
        })
    }

    async fn ensure_dev_addr_free(
        &self,
        dev_eui: DevEui,
        dev_addr: DevAddr,
    ) -> Result<(), LorikeetError> {
        if self.nonces.dev_addr_available(dev_addr, Some(dev_eui)).await? {
            return Ok(());
        }
        warn!(dev_eui = %dev_eui, dev_addr = %dev_addr, "activation rejected: dev_addr conflict");
        Err(LorikeetError::AddressConflict { dev_addr })
    }

    /// Destroy the session. Deactivating an inactive device is a no-op.
    pub async fn deactivate(&self, dev_eui: DevEui) -> Result<(), LorikeetError> {
        let _guard = self.locks.lock(dev_eui).await;
        if self.store.get_device(dev_eui).await?.is_none() {
            return Err(LorikeetError::device_not_found(dev_eui));
        }
        if self
            .store
            .delete_activation(dev_eui, self.queue_policy)
            .await?
        {
            info!(dev_eui = %dev_eui, "device deactivated");
        } else {
            debug!(dev_eui = %dev_eui, "deactivate: no active session");
        }
        Ok(())
    }

    /// The live session. Fails with `NotActivated` when there is none.
    pub async fn get_activation(&self, dev_eui: DevEui) -> Result<DeviceActivation, LorikeetError> {
        if let Some(activation) = self.store.get_activation(dev_eui).await? {
            return Ok(activation);
        }
        if self.store.get_device(dev_eui).await?.is_none() {
            return Err(LorikeetError::device_not_found(dev_eui));
        }
        Err(LorikeetError::NotActivated { dev_eui })
    }

    /// A free random DevAddr for an existing device.
    pub async fn get_random_dev_addr(&self, dev_eui: DevEui) -> Result<DevAddr, LorikeetError> {
        if self.store.get_device(dev_eui).await?.is_none() {
            return Err(LorikeetError::device_not_found(dev_eui));
        }
        self.nonces.next_dev_addr(Some(dev_eui)).await
    }
}

/// Session keys of an ABP request.
///
/// LoRaWAN 1.0.x has a single NwkSKey carried in `nwk_s_enc_key`; the
/// integrity keys must be absent or equal to it. LoRaWAN 1.1 requires all four.
fn abp_session_keys(abp: &AbpActivation) -> Result<SessionKeys, LorikeetError> {
    let keys = if abp.mac_version.is_1_1() {
        let missing = |name: &str| {
            LorikeetError::InvalidParameters(format!("{name} is required for LoRaWAN 1.1"))
        };
        SessionKeys {
            f_nwk_s_int_key: abp
                .f_nwk_s_int_key
                .clone()
                .ok_or_else(|| missing("f_nwk_s_int_key"))?,
            s_nwk_s_int_key: abp
                .s_nwk_s_int_key
                .clone()
                .ok_or_else(|| missing("s_nwk_s_int_key"))?,
            nwk_s_enc_key: abp.nwk_s_enc_key.clone(),
            app_s_key: abp.app_s_key.clone(),
        }
    } else {
        for (name, key) in [
            ("f_nwk_s_int_key", &abp.f_nwk_s_int_key),
            ("s_nwk_s_int_key", &abp.s_nwk_s_int_key),
        ] {
            if let Some(key) = key
                && *key != abp.nwk_s_enc_key
            {
                return Err(LorikeetError::InvalidParameters(format!(
                    "{name} must be omitted or equal nwk_s_enc_key for LoRaWAN {}",
                    abp.mac_version
                )));
            }
        }
        SessionKeys {
            f_nwk_s_int_key: abp.nwk_s_enc_key.clone(),
            s_nwk_s_int_key: abp.nwk_s_enc_key.clone(),
            nwk_s_enc_key: abp.nwk_s_enc_key.clone(),
            app_s_key: abp.app_s_key.clone(),
        }
    };

    for (name, key) in [
        ("f_nwk_s_int_key", &keys.f_nwk_s_int_key),
        ("s_nwk_s_int_key", &keys.s_nwk_s_int_key),
        ("nwk_s_enc_key", &keys.nwk_s_enc_key),
        ("app_s_key", &keys.app_s_key),
    ] {
        if key.is_zero() {
            return Err(LorikeetError::InvalidKeyMaterial(format!(
                "{name} must not be all zeros"
            )));
        }
    }
    Ok(keys)
}

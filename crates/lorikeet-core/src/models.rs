// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted records and the request/response values exchanged with the
//! storage and service traits.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::types::{ActivationMode, AesKey, DevAddr, DevEui, JoinEui, MacVersion};

/// A registered end-device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub dev_eui: DevEui,
    pub name: String,
    pub description: String,
    /// Reference to the (externally managed) device profile.
    pub device_profile_id: String,
    /// When set, OTAA joins are only accepted for this JoinEUI.
    pub join_eui: Option<JoinEui>,
    pub is_disabled: bool,
    /// Accept reused DevNonces (test benches, devices with broken nonce storage).
    pub skip_nonce_validation: bool,
    pub tags: BTreeMap<String, String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// A new enabled device with empty metadata.
    pub fn new(dev_eui: DevEui, name: impl Into<String>, device_profile_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            dev_eui,
            name: name.into(),
            description: String::new(),
            device_profile_id: device_profile_id.into(),
            join_eui: None,
            is_disabled: false,
            skip_nonce_validation: false,
            tags: BTreeMap::new(),
            last_seen_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Filter and paging for device listings.
#[derive(Debug, Clone, Default)]
pub struct DeviceListQuery {
    pub limit: u32,
    pub offset: u32,
    /// Case-insensitive substring match on the device name.
    pub search: Option<String>,
}

/// A page of devices plus the total number of matches.
#[derive(Debug, Clone)]
pub struct DevicePage {
    pub total_count: u64,
    pub devices: Vec<Device>,
}

/// Root keys of a device.
///
/// For LoRaWAN 1.0.x devices `nwk_key` holds the AppKey and `app_key` is unused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceKeys {
    pub dev_eui: DevEui,
    pub nwk_key: AesKey,
    pub app_key: AesKey,
    /// Last JoinNonce issued by the join server for this device.
    pub join_nonce: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceKeys {
    pub fn new(dev_eui: DevEui, nwk_key: AesKey, app_key: AesKey) -> Self {
        let now = Utc::now();
        Self {
            dev_eui,
            nwk_key,
            app_key,
            join_nonce: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Session keys installed on an activation.
///
/// For LoRaWAN 1.0.x the three network keys carry the same NwkSKey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionKeys {
    pub f_nwk_s_int_key: AesKey,
    pub s_nwk_s_int_key: AesKey,
    pub nwk_s_enc_key: AesKey,
    pub app_s_key: AesKey,
}

/// The live session of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceActivation {
    pub dev_eui: DevEui,
    pub dev_addr: DevAddr,
    pub mode: ActivationMode,
    pub mac_version: MacVersion,
    pub join_eui: Option<JoinEui>,
    pub dev_nonce: Option<u16>,
    pub join_nonce: Option<u32>,
    pub keys: SessionKeys,
    /// Next expected uplink frame counter.
    pub f_cnt_up: u32,
    /// Next network downlink frame counter (the only downlink counter for 1.0.x).
    pub n_f_cnt_down: u32,
    /// Next application downlink frame counter (LoRaWAN 1.1).
    pub a_f_cnt_down: u32,
    /// Highest downlink counter acknowledged by the device in this session.
    pub last_acked_f_cnt_down: Option<u32>,
    pub activated_at: DateTime<Utc>,
}

/// Which downlink counter carries application payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum DownlinkCounter {
    /// `n_f_cnt_down`, shared by MAC and application traffic in 1.0.x.
    Network,
    /// `a_f_cnt_down`, used by 1.1 for FPort > 0.
    Application,
}

impl DeviceActivation {
    /// The counter used for queued application downlinks.
    pub fn app_downlink_counter(&self) -> DownlinkCounter {
        if self.mac_version.is_1_1() {
            DownlinkCounter::Application
        } else {
            DownlinkCounter::Network
        }
    }

    /// Next value of the application downlink counter.
    pub fn next_app_f_cnt_down(&self) -> u32 {
        match self.app_downlink_counter() {
            DownlinkCounter::Network => self.n_f_cnt_down,
            DownlinkCounter::Application => self.a_f_cnt_down,
        }
    }
}

/// Status of a downlink queue item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    /// Waiting for transmission.
    Pending,
    /// Confirmed downlink handed to the radio path and awaiting acknowledgement.
    InFlight,
}

/// An entry of a device's downlink queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceQueueItem {
    pub id: Uuid,
    pub dev_eui: DevEui,
    /// Insertion sequence number; strictly increasing, never reused.
    pub seq: i64,
    pub f_port: u8,
    pub data: Vec<u8>,
    pub confirmed: bool,
    pub status: QueueItemStatus,
    /// Downlink counter of the most recent transmission.
    pub f_cnt_down: Option<u32>,
    pub attempts: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub transmitted_at: Option<DateTime<Utc>>,
}

impl DeviceQueueItem {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Caller-supplied fields of a new queue item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueueItem {
    pub f_port: u8,
    pub data: Vec<u8>,
    pub confirmed: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueuedItem {
    pub id: Uuid,
    /// Zero-based position in the queue at insertion time.
    pub position: usize,
}

/// A queue item claimed for transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct Downlink {
    pub item_id: Uuid,
    pub dev_eui: DevEui,
    pub dev_addr: DevAddr,
    pub f_port: u8,
    pub data: Vec<u8>,
    pub confirmed: bool,
    pub f_cnt_down: u32,
    /// 1 for the first transmission, incremented on each re-delivery.
    pub attempt: u32,
}

/// Outcome of a downlink acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The in-flight item was delivered and removed.
    Acknowledged { item_id: Uuid },
    /// Late, duplicate, or unmatched acknowledgement; nothing changed.
    Ignored,
}

/// What happens to queued items when a session is replaced or destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum QueuePolicy {
    /// Remove every queued item.
    Flush,
    /// Keep items; in-flight items return to pending with their counter cleared.
    Requeue,
}

/// A join-request nonce to be recorded together with an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumedNonce {
    pub join_eui: JoinEui,
    pub dev_nonce: u16,
    /// Record even if the nonce is already present (skip-validation devices).
    pub allow_reuse: bool,
}

/// Everything an activation writes, applied in one transaction.
#[derive(Debug, Clone)]
pub struct ActivationCommit {
    pub activation: DeviceActivation,
    pub consumed_nonce: Option<ConsumedNonce>,
    /// New value of `DeviceKeys::join_nonce`.
    pub join_nonce: Option<u32>,
    pub queue_policy: QueuePolicy,
}

/// Expected-then-new value of a downlink counter (optimistic write check).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterUpdate {
    pub counter: DownlinkCounter,
    pub expected: u32,
    pub next: u32,
}

/// Queue changes produced by the downlink planner, applied in one transaction.
#[derive(Debug, Clone, Default)]
pub struct QueueMutation {
    /// Items to delete (expired, acknowledged, or handed-off unconfirmed items).
    pub remove: Vec<Uuid>,
    /// Confirmed item that is now in flight with the given counter.
    pub mark_in_flight: Option<(Uuid, u32)>,
    pub counter: Option<CounterUpdate>,
    pub last_acked_f_cnt_down: Option<u32>,
    pub transmitted_at: Option<DateTime<Utc>>,
}

impl QueueMutation {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty()
            && self.mark_in_flight.is_none()
            && self.counter.is_none()
            && self.last_acked_f_cnt_down.is_none()
    }
}

/// Frame counters supplied when importing an existing session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameCounters {
    pub f_cnt_up: u32,
    pub n_f_cnt_down: u32,
    pub a_f_cnt_down: u32,
}

/// Parameters of an over-the-air activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtaaActivation {
    pub join_eui: JoinEui,
    pub dev_nonce: u16,
    /// Server JoinNonce; allocated from the device keys when absent.
    pub join_nonce: Option<u32>,
    pub mac_version: MacVersion,
    /// Fixed DevAddr; a random one inside the network prefix when absent.
    pub dev_addr: Option<DevAddr>,
    /// Counters of an imported session; a fresh session starts at zero.
    pub counters: Option<FrameCounters>,
}

/// Parameters of an activation by personalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbpActivation {
    pub dev_addr: DevAddr,
    pub mac_version: MacVersion,
    pub app_s_key: AesKey,
    /// NwkSKey for LoRaWAN 1.0.x.
    pub nwk_s_enc_key: AesKey,
    /// Required for 1.1; must be absent or equal to `nwk_s_enc_key` for 1.0.x.
    pub s_nwk_s_int_key: Option<AesKey>,
    /// Required for 1.1; must be absent or equal to `nwk_s_enc_key` for 1.0.x.
    pub f_nwk_s_int_key: Option<AesKey>,
    pub counters: FrameCounters,
}

/// An activation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ActivationRequest {
    Otaa(OtaaActivation),
    Abp(AbpActivation),
}

impl ActivationRequest {
    pub fn mode(&self) -> ActivationMode {
        match self {
            ActivationRequest::Otaa(_) => ActivationMode::Otaa,
            ActivationRequest::Abp(_) => ActivationMode::Abp,
        }
    }
}

// --- Event log ---

/// Radio exchange an event-log entry describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An OTAA join request and its accept or rejection.
    Join,
    /// A downlink handed to the radio path.
    Downlink,
    /// A downlink acknowledgement from the device.
    Ack,
}

/// Outcome of a logged exchange.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameStatusResult {
    Ok,
    Nok,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStatus {
    pub result: FrameStatusResult,
    /// Empty for `Ok`.
    pub error_desc: String,
}

/// One entry of the activation and downlink event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub kind: EventKind,
    pub dev_eui: DevEui,
    /// False when the DevEUI is not registered.
    pub known_device: bool,
    pub dev_addr: Option<DevAddr>,
    pub dev_nonce: Option<u16>,
    pub f_port: Option<u8>,
    pub f_cnt_down: Option<u32>,
    pub frame_status: FrameStatus,
}

impl LogEntry {
    /// A successful entry for a known device.
    pub fn new(kind: EventKind, dev_eui: DevEui) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            kind,
            dev_eui,
            known_device: true,
            dev_addr: None,
            dev_nonce: None,
            f_port: None,
            f_cnt_down: None,
            frame_status: FrameStatus {
                result: FrameStatusResult::Ok,
                error_desc: String::new(),
            },
        }
    }

    pub fn dev_addr(mut self, dev_addr: DevAddr) -> Self {
        self.dev_addr = Some(dev_addr);
        self
    }

    pub fn dev_nonce(mut self, dev_nonce: u16) -> Self {
        self.dev_nonce = Some(dev_nonce);
        self
    }

    pub fn frame(mut self, f_port: u8, f_cnt_down: u32) -> Self {
        self.f_port = Some(f_port);
        self.f_cnt_down = Some(f_cnt_down);
        self
    }

    pub fn f_cnt_down(mut self, f_cnt_down: u32) -> Self {
        self.f_cnt_down = Some(f_cnt_down);
        self
    }

    pub fn unknown_device(mut self) -> Self {
        self.known_device = false;
        self
    }

    pub fn status(mut self, result: FrameStatusResult, error_desc: impl Into<String>) -> Self {
        self.frame_status = FrameStatus {
            result,
            error_desc: error_desc.into(),
        };
        self
    }
}

// --- Metrics placeholder types (served by the external metrics aggregator) ---

/// Aggregated device metrics.
#[derive(Debug, Clone)]
pub struct DeviceMetrics {
    pub _placeholder: (),
}

/// Aggregated link (RSSI/SNR/error) metrics.
#[derive(Debug, Clone)]
pub struct DeviceLinkMetrics {
    pub _placeholder: (),
}

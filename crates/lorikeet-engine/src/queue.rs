// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-device FIFO downlink queue.
//!
//! Frame counters are assigned when an item is handed to the radio path, not
//! when it is enqueued. Expiry is evaluated lazily on read and transmit.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use lorikeet_core::models::{
    AckOutcome, CounterUpdate, DeviceActivation, DeviceQueueItem, Downlink, EnqueuedItem,
    EventKind, FrameStatusResult, LogEntry, NewQueueItem, QueueItemStatus, QueueMutation,
};
use lorikeet_core::{DevEui, LorikeetError};
use tracing::{debug, info};

use crate::SharedStore;
use crate::events::EventLog;
use crate::locks::DeviceLocks;

/// Smallest and largest application FPort.
const MIN_F_PORT: u8 = 1;
const MAX_F_PORT: u8 = 223;

/// Result of planning one transmission.
#[derive(Debug, Clone)]
pub(crate) struct TransmitPlan {
    pub downlink: Option<Downlink>,
    pub mutation: QueueMutation,
}

/// Pick the next downlink from a FIFO snapshot of the queue.
///
/// Expired items are dropped. The head receives the next application
/// downlink counter; unconfirmed heads leave the queue, confirmed heads stay
/// in flight until acknowledged.
pub(crate) fn plan_transmission(
    activation: &DeviceActivation,
    items: &[DeviceQueueItem],
    now: DateTime<Utc>,
) -> Result<TransmitPlan, LorikeetError> {
    let mut mutation = QueueMutation::default();
    let mut head = None;
    for item in items {
        if item.is_expired(now) {
            mutation.remove.push(item.id);
        } else if head.is_none() {
            head = Some(item);
        }
    }

    let Some(head) = head else {
        return Ok(TransmitPlan {
            downlink: None,
            mutation,
        });
    };

    let f_cnt_down = activation.next_app_f_cnt_down();
    let next = f_cnt_down.checked_add(1).ok_or_else(|| {
        LorikeetError::InvalidParameters(format!(
            "downlink frame counter of {} is exhausted; the device must re-activate",
            activation.dev_eui
        ))
    })?;
    mutation.counter = Some(CounterUpdate {
        counter: activation.app_downlink_counter(),
        expected: f_cnt_down,
        next,
    });
    mutation.transmitted_at = Some(now);
    if head.confirmed {
        mutation.mark_in_flight = Some((head.id, f_cnt_down));
    } else {
        mutation.remove.push(head.id);
    }

    Ok(TransmitPlan {
        downlink: Some(Downlink {
            item_id: head.id,
            dev_eui: activation.dev_eui,
            dev_addr: activation.dev_addr,
            f_port: head.f_port,
            data: head.data.clone(),
            confirmed: head.confirmed,
            f_cnt_down,
            attempt: head.attempts + 1,
        }),
        mutation,
    })
}

/// Match an acknowledgement against the in-flight item.
pub(crate) fn plan_acknowledgement(
    activation: &DeviceActivation,
    items: &[DeviceQueueItem],
    f_cnt_down: u32,
) -> (AckOutcome, QueueMutation) {
    let mut mutation = QueueMutation::default();
    if activation
        .last_acked_f_cnt_down
        .is_some_and(|last| f_cnt_down <= last)
    {
        return (AckOutcome::Ignored, mutation);
    }
    let in_flight = items.iter().find(|item| {
        item.status == QueueItemStatus::InFlight && item.f_cnt_down == Some(f_cnt_down)
    });
    match in_flight {
        Some(item) => {
            mutation.remove.push(item.id);
            mutation.last_acked_f_cnt_down = Some(f_cnt_down);
            (AckOutcome::Acknowledged { item_id: item.id }, mutation)
        }
        None => (AckOutcome::Ignored, mutation),
    }
}

#[derive(Clone)]
pub struct DownlinkQueueManager {
    store: SharedStore,
    locks: Arc<DeviceLocks>,
    max_payload_size: usize,
    default_ttl: Option<TimeDelta>,
    events: EventLog,
}

impl DownlinkQueueManager {
    pub fn new(
        store: SharedStore,
        locks: Arc<DeviceLocks>,
        max_payload_size: usize,
        default_ttl: Option<TimeDelta>,
        events: EventLog,
    ) -> Self {
        Self {
            store,
            locks,
            max_payload_size,
            default_ttl,
            events,
        }
    }

    /// Append an item to the tail of the device's queue.
    ///
    /// No session is required; items wait until one exists.
    pub async fn enqueue(
        &self,
        dev_eui: DevEui,
        mut item: NewQueueItem,
    ) -> Result<EnqueuedItem, LorikeetError> {
        let now = Utc::now();
        self.validate(&item, now)?;
        if item.expires_at.is_none() {
            item.expires_at = self.default_ttl.map(|ttl| now + ttl);
        }

        let _guard = self.locks.lock(dev_eui).await;
        let enqueued = self.store.enqueue(dev_eui, &item).await?;
        debug!(
            dev_eui = %dev_eui,
            id = %enqueued.id,
            position = enqueued.position,
            f_port = item.f_port,
            confirmed = item.confirmed,
            "downlink enqueued"
        );
        Ok(enqueued)
    }

    fn validate(&self, item: &NewQueueItem, now: DateTime<Utc>) -> Result<(), LorikeetError> {
        if !(MIN_F_PORT..=MAX_F_PORT).contains(&item.f_port) {
            return Err(LorikeetError::InvalidParameters(format!(
                "f_port must be in {MIN_F_PORT}..={MAX_F_PORT}, got {}",
                item.f_port
            )));
        }
        if item.data.len() > self.max_payload_size {
            return Err(LorikeetError::InvalidParameters(format!(
                "payload of {} bytes exceeds the maximum of {}",
                item.data.len(),
                self.max_payload_size
            )));
        }
        if item.expires_at.is_some_and(|at| at <= now) {
            return Err(LorikeetError::InvalidParameters(
                "expires_at is in the past".into(),
            ));
        }
        Ok(())
    }

    /// FIFO snapshot of unexpired items, in-flight items included.
    pub async fn get_queue(&self, dev_eui: DevEui) -> Result<Vec<DeviceQueueItem>, LorikeetError> {
        if self.store.get_device(dev_eui).await?.is_none() {
            return Err(LorikeetError::device_not_found(dev_eui));
        }
        let now = Utc::now();
        let mut items = self.store.list_queue(dev_eui).await?;
        items.retain(|item| !item.is_expired(now));
        Ok(items)
    }

    /// Remove every queued item. Returns the number removed.
    pub async fn flush_queue(&self, dev_eui: DevEui) -> Result<u64, LorikeetError> {
        let _guard = self.locks.lock(dev_eui).await;
        if self.store.get_device(dev_eui).await?.is_none() {
            return Err(LorikeetError::device_not_found(dev_eui));
        }
        let removed = self.store.flush_queue(dev_eui).await?;
        info!(dev_eui = %dev_eui, removed, "downlink queue flushed");
        Ok(removed)
    }

    /// Claim the head of the queue for transmission.
    ///
    /// Returns `None` for a disabled device or an empty queue and fails with
    /// `NotActivated` without a session.
    pub async fn next_for_transmission(
        &self,
        dev_eui: DevEui,
    ) -> Result<Option<Downlink>, LorikeetError> {
        let _guard = self.locks.lock(dev_eui).await;
        let device = self
            .store
            .get_device(dev_eui)
            .await?
            .ok_or_else(|| LorikeetError::device_not_found(dev_eui))?;
        let activation = self
            .store
            .get_activation(dev_eui)
            .await?
            .ok_or(LorikeetError::NotActivated { dev_eui })?;
        if device.is_disabled {
            debug!(dev_eui = %dev_eui, "device disabled, holding downlinks");
            return Ok(None);
        }

        let items = self.store.list_queue(dev_eui).await?;
        let plan = plan_transmission(&activation, &items, Utc::now())?;
        if !plan.mutation.is_empty() {
            self.store.apply_queue_mutation(dev_eui, &plan.mutation).await?;
        }

        match &plan.downlink {
            Some(downlink) => {
                debug!(
                    dev_eui = %dev_eui,
                    id = %downlink.item_id,
                    f_cnt_down = downlink.f_cnt_down,
                    attempt = downlink.attempt,
                    confirmed = downlink.confirmed,
                    expired = plan.mutation.remove.len() - usize::from(!downlink.confirmed),
                    "downlink claimed"
                );
                self.events
                    .send(
                        LogEntry::new(EventKind::Downlink, dev_eui)
                            .dev_addr(downlink.dev_addr)
                            .frame(downlink.f_port, downlink.f_cnt_down),
                    )
                    .await;
            }
            None if !plan.mutation.remove.is_empty() => debug!(
                dev_eui = %dev_eui,
                expired = plan.mutation.remove.len(),
                "expired downlinks purged"
            ),
            None => {}
        }
        Ok(plan.downlink)
    }

    /// Handle a downlink acknowledgement. Stale, duplicate, or unmatched
    /// acknowledgements are ignored.
    pub async fn acknowledge(
        &self,
        dev_eui: DevEui,
        f_cnt_down: u32,
    ) -> Result<AckOutcome, LorikeetError> {
        let _guard = self.locks.lock(dev_eui).await;
        let ack = LogEntry::new(EventKind::Ack, dev_eui).f_cnt_down(f_cnt_down);
        let Some(activation) = self.store.get_activation(dev_eui).await? else {
            debug!(dev_eui = %dev_eui, f_cnt_down, "ack ignored: no session");
            self.events
                .send(ack.status(FrameStatusResult::Warn, "no active session"))
                .await;
            return Ok(AckOutcome::Ignored);
        };
        let items = self.store.list_queue(dev_eui).await?;
        let (outcome, mutation) = plan_acknowledgement(&activation, &items, f_cnt_down);
        match outcome {
            AckOutcome::Acknowledged { item_id } => {
                self.store.apply_queue_mutation(dev_eui, &mutation).await?;
                info!(dev_eui = %dev_eui, id = %item_id, f_cnt_down, "downlink acknowledged");
                self.events.send(ack.dev_addr(activation.dev_addr)).await;
            }
            AckOutcome::Ignored => {
                debug!(dev_eui = %dev_eui, f_cnt_down, "ack ignored");
                self.events
                    .send(ack.dev_addr(activation.dev_addr).status(
                        FrameStatusResult::Warn,
                        format!("f_cnt_down {f_cnt_down} is stale or not in flight"),
                    ))
                    .await;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;
    use crate::test_support::{D1, eui, manager, manager_with, otaa, otaa_with, provision};
    use futures::future::join_all;
    use lorikeet_core::models::SessionKeys;
    use lorikeet_core::{ActivationMode, AesKey, DevAddr, ErrorKind, MacVersion};
    use uuid::Uuid;

    fn unconfirmed(byte: u8) -> NewQueueItem {
        NewQueueItem {
            f_port: 10,
            data: vec![byte],
            confirmed: false,
            expires_at: None,
        }
    }

    fn confirmed(byte: u8) -> NewQueueItem {
        NewQueueItem {
            confirmed: true,
            ..unconfirmed(byte)
        }
    }

    fn session(mac_version: MacVersion) -> DeviceActivation {
        DeviceActivation {
            dev_eui: eui(D1),
            dev_addr: DevAddr::from_u32(0x2600_0001),
            mode: ActivationMode::Abp,
            mac_version,
            join_eui: None,
            dev_nonce: None,
            join_nonce: None,
            keys: SessionKeys {
                f_nwk_s_int_key: AesKey::from_bytes([1; 16]),
                s_nwk_s_int_key: AesKey::from_bytes([1; 16]),
                nwk_s_enc_key: AesKey::from_bytes([1; 16]),
                app_s_key: AesKey::from_bytes([2; 16]),
            },
            f_cnt_up: 0,
            n_f_cnt_down: 5,
            a_f_cnt_down: 40,
            last_acked_f_cnt_down: None,
            activated_at: Utc::now(),
        }
    }

    fn queued(seq: i64, confirmed: bool, expires_at: Option<DateTime<Utc>>) -> DeviceQueueItem {
        DeviceQueueItem {
            id: Uuid::new_v4(),
            dev_eui: eui(D1),
            seq,
            f_port: 1,
            data: vec![seq as u8],
            confirmed,
            status: QueueItemStatus::Pending,
            f_cnt_down: None,
            attempts: 0,
            expires_at,
            created_at: Utc::now(),
            transmitted_at: None,
        }
    }

    #[test]
    fn plan_skips_expired_and_uses_version_counter() {
        let now = Utc::now();
        let items = [
            queued(1, false, Some(now - TimeDelta::seconds(1))),
            queued(2, true, None),
            queued(3, false, Some(now - TimeDelta::seconds(5))),
        ];

        let plan = plan_transmission(&session(MacVersion::LoRaWAN1_0_3), &items, now).unwrap();
        let downlink = plan.downlink.unwrap();
        assert_eq!(downlink.item_id, items[1].id);
        assert_eq!(downlink.f_cnt_down, 5);
        assert_eq!(plan.mutation.remove, vec![items[0].id, items[2].id]);
        assert_eq!(plan.mutation.mark_in_flight, Some((items[1].id, 5)));

        let plan = plan_transmission(&session(MacVersion::LoRaWAN1_1_0), &items, now).unwrap();
        assert_eq!(plan.downlink.unwrap().f_cnt_down, 40);
        let counter = plan.mutation.counter.unwrap();
        assert_eq!((counter.expected, counter.next), (40, 41));
    }

    #[test]
    fn plan_on_empty_queue_changes_nothing() {
        let plan = plan_transmission(&session(MacVersion::LoRaWAN1_0_3), &[], Utc::now()).unwrap();
        assert!(plan.downlink.is_none());
        assert!(plan.mutation.is_empty());
    }

    #[test]
    fn plan_rejects_counter_overflow() {
        let mut exhausted = session(MacVersion::LoRaWAN1_0_3);
        exhausted.n_f_cnt_down = u32::MAX;
        let err = plan_transmission(&exhausted, &[queued(1, false, None)], Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameters);
    }

    #[test]
    fn ack_planning() {
        let mut in_flight = queued(1, true, None);
        in_flight.status = QueueItemStatus::InFlight;
        in_flight.f_cnt_down = Some(7);
        let items = [in_flight.clone()];
        let mut activation = session(MacVersion::LoRaWAN1_0_3);

        let (outcome, _) = plan_acknowledgement(&activation, &items, 6);
        assert_eq!(outcome, AckOutcome::Ignored);

        let (outcome, mutation) = plan_acknowledgement(&activation, &items, 7);
        assert_eq!(outcome, AckOutcome::Acknowledged { item_id: in_flight.id });
        assert_eq!(mutation.last_acked_f_cnt_down, Some(7));

        activation.last_acked_f_cnt_down = Some(9);
        let (outcome, mutation) = plan_acknowledgement(&activation, &items, 7);
        assert_eq!(outcome, AckOutcome::Ignored);
        assert!(mutation.is_empty());
    }

    #[tokio::test]
    async fn three_unconfirmed_items_drain_in_order() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        manager.activation().activate(d1, otaa(1)).await.unwrap();
        let queue = manager.queue();

        let mut ids = Vec::new();
        for (position, byte) in [0xa, 0xb, 0xc].into_iter().enumerate() {
            let enqueued = queue.enqueue(d1, unconfirmed(byte)).await.unwrap();
            assert_eq!(enqueued.position, position);
            ids.push(enqueued.id);
        }

        let mut counters = Vec::new();
        for (expected_id, expected_byte) in ids.iter().zip([0xa, 0xb, 0xc]) {
            let downlink = queue.next_for_transmission(d1).await.unwrap().unwrap();
            assert_eq!(downlink.item_id, *expected_id);
            assert_eq!(downlink.data, vec![expected_byte]);
            assert_eq!(downlink.attempt, 1);
            counters.push(downlink.f_cnt_down);
        }
        assert!(counters.windows(2).all(|w| w[0] < w[1]), "{counters:?}");
        assert!(queue.get_queue(d1).await.unwrap().is_empty());
        assert!(queue.next_for_transmission(d1).await.unwrap().is_none());

        let session = manager.activation().get_activation(d1).await.unwrap();
        assert_eq!(session.n_f_cnt_down, 3);
    }

    #[tokio::test]
    async fn enqueue_then_get_queue_is_fifo() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        for byte in 1..=4 {
            manager.queue().enqueue(d1, unconfirmed(byte)).await.unwrap();
        }
        let queue = manager.queue().get_queue(d1).await.unwrap();
        assert_eq!(
            queue.iter().map(|i| i.data[0]).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert!(queue.windows(2).all(|w| w[0].seq < w[1].seq));
        assert!(queue.iter().all(|i| i.status == QueueItemStatus::Pending));
    }

    #[tokio::test]
    async fn flush_then_enqueue_starts_fresh() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        for byte in 1..=3 {
            manager.queue().enqueue(d1, unconfirmed(byte)).await.unwrap();
        }
        assert_eq!(manager.queue().flush_queue(d1).await.unwrap(), 3);
        assert!(manager.queue().get_queue(d1).await.unwrap().is_empty());

        let enqueued = manager.queue().enqueue(d1, unconfirmed(9)).await.unwrap();
        assert_eq!(enqueued.position, 0);
        assert_eq!(manager.queue().get_queue(d1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn confirmed_item_is_redelivered_until_acknowledged() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        manager.activation().activate(d1, otaa(1)).await.unwrap();
        let queue = manager.queue();
        let confirmed_id = queue.enqueue(d1, confirmed(1)).await.unwrap().id;
        queue.enqueue(d1, unconfirmed(2)).await.unwrap();

        let first = queue.next_for_transmission(d1).await.unwrap().unwrap();
        assert_eq!(first.item_id, confirmed_id);
        assert_eq!(first.attempt, 1);
        let snapshot = queue.get_queue(d1).await.unwrap();
        assert_eq!(snapshot[0].status, QueueItemStatus::InFlight);
        assert_eq!(snapshot[0].f_cnt_down, Some(first.f_cnt_down));

        let retry = queue.next_for_transmission(d1).await.unwrap().unwrap();
        assert_eq!(retry.item_id, confirmed_id);
        assert_eq!(retry.attempt, 2);
        assert!(retry.f_cnt_down > first.f_cnt_down);

        // The first transmission's counter no longer matches.
        assert_eq!(
            queue.acknowledge(d1, first.f_cnt_down).await.unwrap(),
            AckOutcome::Ignored
        );
        assert_eq!(
            queue.acknowledge(d1, retry.f_cnt_down).await.unwrap(),
            AckOutcome::Acknowledged {
                item_id: confirmed_id
            }
        );
        let session = manager.activation().get_activation(d1).await.unwrap();
        assert_eq!(session.last_acked_f_cnt_down, Some(retry.f_cnt_down));

        let next = queue.next_for_transmission(d1).await.unwrap().unwrap();
        assert_eq!(next.data, vec![2]);
        assert!(next.f_cnt_down > retry.f_cnt_down);
    }

    #[tokio::test]
    async fn stale_ack_leaves_queue_unchanged() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        manager.activation().activate(d1, otaa(1)).await.unwrap();
        let queue = manager.queue();

        queue.enqueue(d1, confirmed(1)).await.unwrap();
        let sent = queue.next_for_transmission(d1).await.unwrap().unwrap();
        queue.acknowledge(d1, sent.f_cnt_down).await.unwrap();

        queue.enqueue(d1, confirmed(2)).await.unwrap();
        let in_flight = queue.next_for_transmission(d1).await.unwrap().unwrap();
        let before = queue.get_queue(d1).await.unwrap();

        for stale in [sent.f_cnt_down, in_flight.f_cnt_down + 5] {
            assert_eq!(
                queue.acknowledge(d1, stale).await.unwrap(),
                AckOutcome::Ignored
            );
        }
        let after = queue.get_queue(d1).await.unwrap();
        assert_eq!(before.len(), after.len());
        assert_eq!(after[0].id, in_flight.item_id);
        assert_eq!(after[0].status, QueueItemStatus::InFlight);
        assert_eq!(after[0].attempts, before[0].attempts);
        let session = manager.activation().get_activation(d1).await.unwrap();
        assert_eq!(session.last_acked_f_cnt_down, Some(sent.f_cnt_down));
    }

    #[tokio::test]
    async fn ack_without_session_is_ignored() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        assert_eq!(
            manager.queue().acknowledge(d1, 1).await.unwrap(),
            AckOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn transmission_requires_session_and_enabled_device() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        manager.queue().enqueue(d1, unconfirmed(1)).await.unwrap();

        let err = manager.queue().next_for_transmission(d1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotActivated);

        manager.activation().activate(d1, otaa(1)).await.unwrap();
        let mut device = manager.registry().get(d1).await.unwrap();
        device.is_disabled = true;
        manager.registry().update(device.clone()).await.unwrap();
        assert!(manager.queue().next_for_transmission(d1).await.unwrap().is_none());
        assert_eq!(manager.queue().get_queue(d1).await.unwrap().len(), 1);

        device.is_disabled = false;
        manager.registry().update(device).await.unwrap();
        assert!(manager.queue().next_for_transmission(d1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lorawan_1_1_uses_application_counter() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        manager
            .activation()
            .activate(d1, otaa_with(1, MacVersion::LoRaWAN1_1_0))
            .await
            .unwrap();
        manager.queue().enqueue(d1, unconfirmed(1)).await.unwrap();
        manager.queue().next_for_transmission(d1).await.unwrap().unwrap();

        let session = manager.activation().get_activation(d1).await.unwrap();
        assert_eq!(session.a_f_cnt_down, 1);
        assert_eq!(session.n_f_cnt_down, 0);
    }

    #[tokio::test]
    async fn enqueue_validation() {
        let config = EngineConfig {
            max_payload_size: 4,
            ..EngineConfig::default()
        };
        let (manager, _dir) = manager_with(config).await;
        let d1 = eui(D1);

        let err = manager.queue().enqueue(d1, unconfirmed(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        provision(&manager, d1).await;
        for bad in [
            NewQueueItem {
                f_port: 0,
                ..unconfirmed(1)
            },
            NewQueueItem {
                f_port: 224,
                ..unconfirmed(1)
            },
            NewQueueItem {
                data: vec![0; 5],
                ..unconfirmed(1)
            },
            NewQueueItem {
                expires_at: Some(Utc::now() - TimeDelta::seconds(1)),
                ..unconfirmed(1)
            },
        ] {
            let err = manager.queue().enqueue(d1, bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameters);
        }
        manager
            .queue()
            .enqueue(
                d1,
                NewQueueItem {
                    f_port: 223,
                    data: vec![0; 4],
                    ..unconfirmed(1)
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn default_ttl_expires_items_lazily() {
        let config = EngineConfig {
            default_ttl: Some(TimeDelta::milliseconds(500)),
            ..EngineConfig::default()
        };
        let (manager, _dir) = manager_with(config).await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        manager.activation().activate(d1, otaa(1)).await.unwrap();
        manager.queue().enqueue(d1, unconfirmed(1)).await.unwrap();
        manager
            .queue()
            .enqueue(
                d1,
                NewQueueItem {
                    expires_at: Some(Utc::now() + TimeDelta::hours(1)),
                    ..unconfirmed(2)
                },
            )
            .await
            .unwrap();
        assert!(manager.queue().get_queue(d1).await.unwrap()[0].expires_at.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(700)).await;
        let snapshot = manager.queue().get_queue(d1).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].data, vec![2]);

        let downlink = manager.queue().next_for_transmission(d1).await.unwrap().unwrap();
        assert_eq!(downlink.data, vec![2]);
        assert_eq!(downlink.f_cnt_down, 0);
    }

    #[tokio::test]
    async fn concurrent_claims_never_share_a_counter() {
        let (manager, _dir) = manager().await;
        let d1 = eui(D1);
        provision(&manager, d1).await;
        manager.activation().activate(d1, otaa(1)).await.unwrap();
        for byte in 0..10 {
            manager.queue().enqueue(d1, unconfirmed(byte)).await.unwrap();
        }
        let manager = Arc::new(manager);

        let tasks = (0..10).map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.queue().next_for_transmission(d1).await })
        });
        let mut claimed: Vec<_> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap().unwrap())
            .collect();
        claimed.sort_by_key(|d| d.f_cnt_down);

        let counters: Vec<_> = claimed.iter().map(|d| d.f_cnt_down).collect();
        assert_eq!(counters, (0..10).collect::<Vec<_>>());
        // Counter order matches insertion order.
        let payloads: Vec<_> = claimed.iter().map(|d| d.data[0]).collect();
        assert_eq!(payloads, (0..10).collect::<Vec<u8>>());
    }
}

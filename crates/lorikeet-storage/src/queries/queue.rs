// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-device downlink queue operations.
//!
//! Items are ordered by the AUTOINCREMENT `seq` column, which is never
//! reused, so FIFO order survives flushes and deletions.

use chrono::Utc;
use lorikeet_core::models::{
    DeviceQueueItem, DownlinkCounter, EnqueuedItem, NewQueueItem, QueueItemStatus, QueueMutation,
    QueuePolicy,
};
use lorikeet_core::{DevEui, LorikeetError};
use rusqlite::{Row, Transaction, params};
use uuid::Uuid;

use super::{device_exists, opt_ts_from_row, parse_from_row, ts_from_row, ts_to_sql};
use crate::database::{Database, QueryError, map_tr_err};

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<DeviceQueueItem> {
    let id: String = row.get(1)?;
    let status: String = row.get(7)?;
    let conversion = |idx, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };
    Ok(DeviceQueueItem {
        seq: row.get(0)?,
        id: Uuid::parse_str(&id).map_err(|e| conversion(1, Box::new(e)))?,
        dev_eui: parse_from_row(row, 2)?,
        f_port: row.get(3)?,
        data: row.get(4)?,
        confirmed: row.get(5)?,
        attempts: row.get(6)?,
        status: status.parse().map_err(|e: strum::ParseError| conversion(7, Box::new(e)))?,
        f_cnt_down: row.get(8)?,
        expires_at: opt_ts_from_row(row, 9)?,
        created_at: ts_from_row(row, 10)?,
        transmitted_at: opt_ts_from_row(row, 11)?,
    })
}

/// Apply a session-change queue policy. Returns the number of items touched.
pub(crate) fn apply_policy_in_tx(
    tx: &Transaction<'_>,
    dev_eui: DevEui,
    policy: QueuePolicy,
) -> rusqlite::Result<usize> {
    match policy {
        QueuePolicy::Flush => tx.execute(
            "DELETE FROM device_queue_item WHERE dev_eui = ?1",
            params![dev_eui.to_string()],
        ),
        QueuePolicy::Requeue => tx.execute(
            "UPDATE device_queue_item SET status = 'pending', f_cnt_down = NULL
             WHERE dev_eui = ?1 AND status = 'in_flight'",
            params![dev_eui.to_string()],
        ),
    }
}

/// Append an item at the tail of the device's queue.
///
/// Fails with `NotFound` for an unknown device. The returned position counts
/// the unexpired items stored ahead of the new one.
pub async fn enqueue(
    db: &Database,
    dev_eui: DevEui,
    item: &NewQueueItem,
) -> Result<EnqueuedItem, LorikeetError> {
    let item = item.clone();
    db.connection()
        .call(move |conn| -> Result<EnqueuedItem, QueryError> {
            let tx = conn.transaction()?;
            if !device_exists(&tx, dev_eui)? {
                return Err(LorikeetError::device_not_found(dev_eui).into());
            }
            let id = Uuid::new_v4();
            let now = ts_to_sql(&Utc::now());
            tx.execute(
                "INSERT INTO device_queue_item (id, dev_eui, f_port, data, confirmed, status,
                     attempts, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6, ?7)",
                params![
                    id.to_string(),
                    dev_eui.to_string(),
                    item.f_port,
                    item.data,
                    item.confirmed,
                    item.expires_at.as_ref().map(ts_to_sql),
                    now,
                ],
            )?;
            let seq = tx.last_insert_rowid();
            let ahead: i64 = tx.query_row(
                "SELECT COUNT(*) FROM device_queue_item
                 WHERE dev_eui = ?1 AND seq < ?2 AND (expires_at IS NULL OR expires_at > ?3)",
                params![dev_eui.to_string(), seq, now],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(EnqueuedItem {
                id,
                position: ahead as usize,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// All items of the device in FIFO order, expired ones included.
pub async fn list_queue(db: &Database, dev_eui: DevEui) -> Result<Vec<DeviceQueueItem>, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<Vec<DeviceQueueItem>, QueryError> {
            let mut stmt = conn.prepare(
                "SELECT seq, id, dev_eui, f_port, data, confirmed, attempts, status, f_cnt_down,
                        expires_at, created_at, transmitted_at
                 FROM device_queue_item WHERE dev_eui = ?1 ORDER BY seq ASC",
            )?;
            let items = stmt
                .query_map(params![dev_eui.to_string()], item_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(items)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove every item of the device. Returns the number removed.
pub async fn flush_queue(db: &Database, dev_eui: DevEui) -> Result<u64, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<u64, QueryError> {
            let tx = conn.transaction()?;
            let removed = apply_policy_in_tx(&tx, dev_eui, QueuePolicy::Flush)?;
            tx.commit()?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Apply the planner's queue changes and counter update in one transaction.
///
/// The counter update is conditional on the counter still holding its
/// expected value; otherwise the whole mutation is rejected with `Internal`.
pub async fn apply_queue_mutation(
    db: &Database,
    dev_eui: DevEui,
    mutation: &QueueMutation,
) -> Result<(), LorikeetError> {
    let mutation = mutation.clone();
    db.connection()
        .call(move |conn| -> Result<(), QueryError> {
            let eui = dev_eui.to_string();
            let tx = conn.transaction()?;

            if let Some(update) = mutation.counter {
                let sql = match update.counter {
                    DownlinkCounter::Network => {
                        "UPDATE device_activation SET n_f_cnt_down = ?2
                         WHERE dev_eui = ?1 AND n_f_cnt_down = ?3"
                    }
                    DownlinkCounter::Application => {
                        "UPDATE device_activation SET a_f_cnt_down = ?2
                         WHERE dev_eui = ?1 AND a_f_cnt_down = ?3"
                    }
                };
                if tx.execute(sql, params![eui, update.next, update.expected])? == 0 {
                    return Err(LorikeetError::Internal(format!(
                        "{} downlink counter of {dev_eui} changed concurrently",
                        update.counter
                    ))
                    .into());
                }
            }

            if let Some(acked) = mutation.last_acked_f_cnt_down {
                tx.execute(
                    "UPDATE device_activation SET last_acked_f_cnt_down = ?2 WHERE dev_eui = ?1",
                    params![eui, acked],
                )?;
            }

            for id in &mutation.remove {
                tx.execute(
                    "DELETE FROM device_queue_item WHERE dev_eui = ?1 AND id = ?2",
                    params![eui, id.to_string()],
                )?;
            }

            if let Some((id, f_cnt_down)) = mutation.mark_in_flight {
                let transmitted_at = mutation.transmitted_at.unwrap_or_else(Utc::now);
                tx.execute(
                    "UPDATE device_queue_item
                     SET status = ?3, f_cnt_down = ?4, attempts = attempts + 1, transmitted_at = ?5
                     WHERE dev_eui = ?1 AND id = ?2",
                    params![
                        eui,
                        id.to_string(),
                        QueueItemStatus::InFlight.to_string(),
                        f_cnt_down,
                        ts_to_sql(&transmitted_at),
                    ],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

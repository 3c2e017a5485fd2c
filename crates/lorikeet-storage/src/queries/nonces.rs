// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Join-request DevNonce history.
//!
//! Entries are kept until flushed or until the device is deleted.

use chrono::Utc;
use lorikeet_core::models::ConsumedNonce;
use lorikeet_core::{DevEui, JoinEui, LorikeetError};
use rusqlite::{Transaction, params};

use super::{device_exists, ts_to_sql};
use crate::database::{Database, QueryError, map_tr_err};

/// Record `nonce` for the device within an open transaction.
///
/// Fails with `ReplayDetected` if the nonce is already recorded and
/// `allow_reuse` is false; with `allow_reuse` the consumption time is refreshed.
pub(crate) fn consume_in_tx(
    tx: &Transaction<'_>,
    dev_eui: DevEui,
    nonce: ConsumedNonce,
) -> Result<(), QueryError> {
    let now = ts_to_sql(&Utc::now());
    let inserted = tx.execute(
        "INSERT INTO dev_nonce (dev_eui, join_eui, dev_nonce, consumed_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (dev_eui, join_eui, dev_nonce) DO NOTHING",
        params![dev_eui.to_string(), nonce.join_eui.to_string(), nonce.dev_nonce, now],
    )?;
    if inserted == 0 {
        if !nonce.allow_reuse {
            return Err(LorikeetError::ReplayDetected {
                dev_eui,
                join_eui: nonce.join_eui,
                dev_nonce: nonce.dev_nonce,
            }
            .into());
        }
        tx.execute(
            "UPDATE dev_nonce SET consumed_at = ?4
             WHERE dev_eui = ?1 AND join_eui = ?2 AND dev_nonce = ?3",
            params![dev_eui.to_string(), nonce.join_eui.to_string(), nonce.dev_nonce, now],
        )?;
    }
    Ok(())
}

/// True if the nonce has been recorded for the device and JoinEUI.
pub async fn is_dev_nonce_used(
    db: &Database,
    dev_eui: DevEui,
    join_eui: JoinEui,
    dev_nonce: u16,
) -> Result<bool, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<bool, QueryError> {
            let used = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM dev_nonce
                     WHERE dev_eui = ?1 AND join_eui = ?2 AND dev_nonce = ?3)",
                params![dev_eui.to_string(), join_eui.to_string(), dev_nonce],
                |row| row.get(0),
            )?;
            Ok(used)
        })
        .await
        .map_err(map_tr_err)
}

/// Check and record a nonce in one transaction.
///
/// Fails with `NotFound` for an unknown device and `ReplayDetected` for a
/// nonce already recorded (unless `allow_reuse`).
pub async fn consume_dev_nonce(
    db: &Database,
    dev_eui: DevEui,
    nonce: ConsumedNonce,
) -> Result<(), LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<(), QueryError> {
            let tx = conn.transaction()?;
            if !device_exists(&tx, dev_eui)? {
                return Err(LorikeetError::device_not_found(dev_eui).into());
            }
            consume_in_tx(&tx, dev_eui, nonce)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove every recorded nonce of the device. Returns the number removed.
pub async fn flush_dev_nonces(db: &Database, dev_eui: DevEui) -> Result<u64, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<u64, QueryError> {
            let removed = conn.execute(
                "DELETE FROM dev_nonce WHERE dev_eui = ?1",
                params![dev_eui.to_string()],
            )?;
            Ok(removed as u64)
        })
        .await
        .map_err(map_tr_err)
}

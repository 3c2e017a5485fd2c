// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Root key CRUD operations.

use lorikeet_core::models::DeviceKeys;
use lorikeet_core::{DevEui, LorikeetError};
use rusqlite::params;

use super::{device_exists, key_from_row, parse_from_row, ts_from_row, ts_to_sql};
use crate::database::{Database, QueryError, map_tr_err};

fn keys_not_found(dev_eui: DevEui) -> LorikeetError {
    LorikeetError::NotFound {
        entity: "device keys",
        key: dev_eui.to_string(),
    }
}

/// Store the root keys of a device.
///
/// Fails with `NotFound` for an unknown device and `AlreadyExists` if the
/// device already has keys.
pub async fn create_keys(db: &Database, keys: &DeviceKeys) -> Result<(), LorikeetError> {
    let keys = keys.clone();
    db.connection()
        .call(move |conn| -> Result<(), QueryError> {
            let tx = conn.transaction()?;
            if !device_exists(&tx, keys.dev_eui)? {
                return Err(LorikeetError::device_not_found(keys.dev_eui).into());
            }
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM device_keys WHERE dev_eui = ?1)",
                params![keys.dev_eui.to_string()],
                |row| row.get(0),
            )?;
            if exists {
                return Err(LorikeetError::AlreadyExists {
                    entity: "device keys",
                    key: keys.dev_eui.to_string(),
                }
                .into());
            }
            tx.execute(
                "INSERT INTO device_keys (dev_eui, nwk_key, app_key, join_nonce, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    keys.dev_eui.to_string(),
                    keys.nwk_key.as_bytes().as_slice(),
                    keys.app_key.as_bytes().as_slice(),
                    keys.join_nonce,
                    ts_to_sql(&keys.created_at),
                    ts_to_sql(&keys.updated_at),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get the root keys of a device.
pub async fn get_keys(db: &Database, dev_eui: DevEui) -> Result<Option<DeviceKeys>, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<Option<DeviceKeys>, QueryError> {
            let result = conn.query_row(
                "SELECT dev_eui, nwk_key, app_key, join_nonce, created_at, updated_at
                 FROM device_keys WHERE dev_eui = ?1",
                params![dev_eui.to_string()],
                |row| {
                    Ok(DeviceKeys {
                        dev_eui: parse_from_row(row, 0)?,
                        nwk_key: key_from_row(row, 1)?,
                        app_key: key_from_row(row, 2)?,
                        join_nonce: row.get(3)?,
                        created_at: ts_from_row(row, 4)?,
                        updated_at: ts_from_row(row, 5)?,
                    })
                },
            );
            match result {
                Ok(keys) => Ok(Some(keys)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the root keys and JoinNonce counter. Fails with `NotFound` if the
/// device has no keys.
pub async fn update_keys(db: &Database, keys: &DeviceKeys) -> Result<(), LorikeetError> {
    let keys = keys.clone();
    db.connection()
        .call(move |conn| -> Result<(), QueryError> {
            let updated = conn.execute(
                "UPDATE device_keys SET nwk_key = ?2, app_key = ?3, join_nonce = ?4, updated_at = ?5
                 WHERE dev_eui = ?1",
                params![
                    keys.dev_eui.to_string(),
                    keys.nwk_key.as_bytes().as_slice(),
                    keys.app_key.as_bytes().as_slice(),
                    keys.join_nonce,
                    ts_to_sql(&keys.updated_at),
                ],
            )?;
            if updated == 0 {
                return Err(keys_not_found(keys.dev_eui).into());
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete the root keys of a device. Returns false if there were none.
pub async fn delete_keys(db: &Database, dev_eui: DevEui) -> Result<bool, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<bool, QueryError> {
            let deleted = conn.execute(
                "DELETE FROM device_keys WHERE dev_eui = ?1",
                params![dev_eui.to_string()],
            )?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

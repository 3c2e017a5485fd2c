// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device CRUD operations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lorikeet_core::models::{Device, DeviceListQuery, DevicePage};
use lorikeet_core::{DevEui, LorikeetError};
use rusqlite::types::Type;
use rusqlite::{Row, params};

use super::{device_exists, opt_parse_from_row, opt_ts_from_row, parse_from_row, ts_from_row, ts_to_sql};
use crate::database::{Database, QueryError, map_tr_err};

const DEVICE_COLUMNS: &str = "dev_eui, name, description, device_profile_id, join_eui, is_disabled,
     skip_nonce_validation, tags, last_seen_at, created_at, updated_at";

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<Device> {
    let tags: String = row.get(7)?;
    let tags: BTreeMap<String, String> = serde_json::from_str(&tags)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    Ok(Device {
        dev_eui: parse_from_row(row, 0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        device_profile_id: row.get(3)?,
        join_eui: opt_parse_from_row(row, 4)?,
        is_disabled: row.get(5)?,
        skip_nonce_validation: row.get(6)?,
        tags,
        last_seen_at: opt_ts_from_row(row, 8)?,
        created_at: ts_from_row(row, 9)?,
        updated_at: ts_from_row(row, 10)?,
    })
}

fn tags_to_sql(tags: &BTreeMap<String, String>) -> Result<String, QueryError> {
    serde_json::to_string(tags)
        .map_err(|e| LorikeetError::InvalidParameters(format!("unserializable tags: {e}")).into())
}

/// Insert a device. Fails with `AlreadyExists` on a duplicate DevEUI.
pub async fn create_device(db: &Database, device: &Device) -> Result<(), LorikeetError> {
    let device = device.clone();
    db.connection()
        .call(move |conn| -> Result<(), QueryError> {
            let tx = conn.transaction()?;
            if device_exists(&tx, device.dev_eui)? {
                return Err(LorikeetError::AlreadyExists {
                    entity: "device",
                    key: device.dev_eui.to_string(),
                }
                .into());
            }
            tx.execute(
                "INSERT INTO device (dev_eui, name, description, device_profile_id, join_eui,
                     is_disabled, skip_nonce_validation, tags, last_seen_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    device.dev_eui.to_string(),
                    device.name,
                    device.description,
                    device.device_profile_id,
                    device.join_eui.map(|e| e.to_string()),
                    device.is_disabled,
                    device.skip_nonce_validation,
                    tags_to_sql(&device.tags)?,
                    device.last_seen_at.as_ref().map(ts_to_sql),
                    ts_to_sql(&device.created_at),
                    ts_to_sql(&device.updated_at),
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a device by DevEUI.
pub async fn get_device(db: &Database, dev_eui: DevEui) -> Result<Option<Device>, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<Option<Device>, QueryError> {
            let mut stmt =
                conn.prepare(&format!("SELECT {DEVICE_COLUMNS} FROM device WHERE dev_eui = ?1"))?;
            match stmt.query_row(params![dev_eui.to_string()], device_from_row) {
                Ok(device) => Ok(Some(device)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the mutable fields of a device. `created_at` and `last_seen_at`
/// are kept. Fails with `NotFound` for an unknown DevEUI.
pub async fn update_device(db: &Database, device: &Device) -> Result<(), LorikeetError> {
    let device = device.clone();
    db.connection()
        .call(move |conn| -> Result<(), QueryError> {
            let updated = conn.execute(
                "UPDATE device SET name = ?2, description = ?3, device_profile_id = ?4,
                     join_eui = ?5, is_disabled = ?6, skip_nonce_validation = ?7, tags = ?8,
                     updated_at = ?9
                 WHERE dev_eui = ?1",
                params![
                    device.dev_eui.to_string(),
                    device.name,
                    device.description,
                    device.device_profile_id,
                    device.join_eui.map(|e| e.to_string()),
                    device.is_disabled,
                    device.skip_nonce_validation,
                    tags_to_sql(&device.tags)?,
                    ts_to_sql(&device.updated_at),
                ],
            )?;
            if updated == 0 {
                return Err(LorikeetError::device_not_found(device.dev_eui).into());
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a device; keys, session, nonce history and queue go with it.
/// Returns false if the device did not exist.
pub async fn delete_device(db: &Database, dev_eui: DevEui) -> Result<bool, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<bool, QueryError> {
            let deleted =
                conn.execute("DELETE FROM device WHERE dev_eui = ?1", params![dev_eui.to_string()])?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// List devices ordered by DevEUI. A `limit` of 0 returns every match.
pub async fn list_devices(db: &Database, query: &DeviceListQuery) -> Result<DevicePage, LorikeetError> {
    let search = query.search.clone().unwrap_or_default();
    let limit: i64 = if query.limit == 0 { -1 } else { i64::from(query.limit) };
    let offset = i64::from(query.offset);
    db.connection()
        .call(move |conn| -> Result<DevicePage, QueryError> {
            let filter = "(?1 = '' OR instr(lower(name), lower(?1)) > 0)";
            let total_count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM device WHERE {filter}"),
                params![search],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {DEVICE_COLUMNS} FROM device WHERE {filter}
                 ORDER BY dev_eui ASC LIMIT ?2 OFFSET ?3"
            ))?;
            let devices = stmt
                .query_map(params![search, limit, offset], device_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(DevicePage {
                total_count: total_count as u64,
                devices,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Record the time of the latest uplink. Fails with `NotFound` for an unknown DevEUI.
pub async fn mark_device_seen(
    db: &Database,
    dev_eui: DevEui,
    at: DateTime<Utc>,
) -> Result<(), LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<(), QueryError> {
            let updated = conn.execute(
                "UPDATE device SET last_seen_at = ?2 WHERE dev_eui = ?1",
                params![dev_eui.to_string(), ts_to_sql(&at)],
            )?;
            if updated == 0 {
                return Err(LorikeetError::device_not_found(dev_eui).into());
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{dev_eui, setup_db, setup_device};
    use lorikeet_core::ErrorKind;

    #[tokio::test]
    async fn create_and_get_device() {
        let (db, _dir) = setup_db().await;
        let mut device = Device::new(dev_eui("0011223344556677"), "meter-1", "profile-a");
        device.join_eui = Some("70b3d57ed0000000".parse().unwrap());
        device.tags.insert("site".into(), "north".into());
        create_device(&db, &device).await.unwrap();

        let stored = get_device(&db, device.dev_eui).await.unwrap().unwrap();
        assert_eq!(stored.name, "meter-1");
        assert_eq!(stored.join_eui, device.join_eui);
        assert_eq!(stored.tags.get("site").map(String::as_str), Some("north"));
        assert!(!stored.is_disabled);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_create_is_already_exists() {
        let (db, _dir) = setup_db().await;
        let eui = setup_device(&db, "0011223344556677").await;
        let err = create_device(&db, &Device::new(eui, "again", "p")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_device_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_device(&db, dev_eui("ffffffffffffffff")).await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_changes_fields_and_missing_is_not_found() {
        let (db, _dir) = setup_db().await;
        let eui = setup_device(&db, "0011223344556677").await;
        let mut device = get_device(&db, eui).await.unwrap().unwrap();
        device.is_disabled = true;
        device.description = "on the roof".into();
        update_device(&db, &device).await.unwrap();

        let stored = get_device(&db, eui).await.unwrap().unwrap();
        assert!(stored.is_disabled);
        assert_eq!(stored.description, "on the roof");

        let ghost = Device::new(dev_eui("0101010101010101"), "ghost", "p");
        let err = update_device(&db, &ghost).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_and_pages() {
        let (db, _dir) = setup_db().await;
        for i in 0..5u8 {
            let eui = DevEui::from_be_bytes([0, 0, 0, 0, 0, 0, 0, i]);
            let name = if i % 2 == 0 { format!("Meter-{i}") } else { format!("valve-{i}") };
            create_device(&db, &Device::new(eui, name, "p")).await.unwrap();
        }

        let all = list_devices(&db, &DeviceListQuery::default()).await.unwrap();
        assert_eq!(all.total_count, 5);
        assert_eq!(all.devices.len(), 5);

        let meters = list_devices(
            &db,
            &DeviceListQuery {
                limit: 2,
                offset: 1,
                search: Some("meter".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(meters.total_count, 3);
        assert_eq!(meters.devices.len(), 2);
        assert_eq!(meters.devices[0].name, "Meter-2");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn mark_seen_sets_timestamp() {
        let (db, _dir) = setup_db().await;
        let eui = setup_device(&db, "0011223344556677").await;
        let at = "2026-03-01T12:00:00.250Z".parse::<DateTime<Utc>>().unwrap();
        mark_device_seen(&db, eui, at).await.unwrap();
        let stored = get_device(&db, eui).await.unwrap().unwrap();
        assert_eq!(stored.last_seen_at, Some(at));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let (db, _dir) = setup_db().await;
        let eui = setup_device(&db, "0011223344556677").await;
        assert!(delete_device(&db, eui).await.unwrap());
        assert!(!delete_device(&db, eui).await.unwrap());
        db.close().await.unwrap();
    }
}

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device session (activation) operations.

use lorikeet_core::models::{ActivationCommit, DeviceActivation, QueuePolicy, SessionKeys};
use lorikeet_core::{DevAddr, DevEui, LorikeetError};
use rusqlite::{OptionalExtension, Row, Transaction, params};
use tracing::debug;

use super::{
    device_exists, key_from_row, opt_parse_from_row, parse_from_row, ts_from_row, ts_to_sql,
};
use crate::database::{Database, QueryError, map_tr_err};
use crate::queries::{nonces, queue};

const ACTIVATION_COLUMNS: &str = "dev_eui, dev_addr, mode, mac_version, join_eui, dev_nonce,
     join_nonce, f_nwk_s_int_key, s_nwk_s_int_key, nwk_s_enc_key, app_s_key, f_cnt_up,
     n_f_cnt_down, a_f_cnt_down, last_acked_f_cnt_down, activated_at";

fn activation_from_row(row: &Row<'_>) -> rusqlite::Result<DeviceActivation> {
    Ok(DeviceActivation {
        dev_eui: parse_from_row(row, 0)?,
        dev_addr: parse_from_row(row, 1)?,
        mode: parse_strum(row, 2)?,
        mac_version: parse_strum(row, 3)?,
        join_eui: opt_parse_from_row(row, 4)?,
        dev_nonce: row.get(5)?,
        join_nonce: row.get(6)?,
        keys: SessionKeys {
            f_nwk_s_int_key: key_from_row(row, 7)?,
            s_nwk_s_int_key: key_from_row(row, 8)?,
            nwk_s_enc_key: key_from_row(row, 9)?,
            app_s_key: key_from_row(row, 10)?,
        },
        f_cnt_up: row.get(11)?,
        n_f_cnt_down: row.get(12)?,
        a_f_cnt_down: row.get(13)?,
        last_acked_f_cnt_down: row.get(14)?,
        activated_at: ts_from_row(row, 15)?,
    })
}

fn parse_strum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = strum::ParseError>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn get_in_tx(
    tx: &Transaction<'_>,
    dev_eui: DevEui,
) -> rusqlite::Result<Option<DeviceActivation>> {
    tx.query_row(
        &format!("SELECT {ACTIVATION_COLUMNS} FROM device_activation WHERE dev_eui = ?1"),
        params![dev_eui.to_string()],
        activation_from_row,
    )
    .optional()
}

fn holder_of(
    tx: &Transaction<'_>,
    dev_addr: DevAddr,
    exclude: Option<DevEui>,
) -> rusqlite::Result<Option<String>> {
    tx.query_row(
        "SELECT dev_eui FROM device_activation WHERE dev_addr = ?1 AND dev_eui <> ?2",
        params![
            dev_addr.to_string(),
            exclude.map(|e| e.to_string()).unwrap_or_default()
        ],
        |row| row.get(0),
    )
    .optional()
}

/// Get the live session of a device.
pub async fn get_activation(
    db: &Database,
    dev_eui: DevEui,
) -> Result<Option<DeviceActivation>, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<Option<DeviceActivation>, QueryError> {
            let tx = conn.transaction()?;
            let activation = get_in_tx(&tx, dev_eui)?;
            tx.commit()?;
            Ok(activation)
        })
        .await
        .map_err(map_tr_err)
}

/// Install a session in one transaction: record the join nonce, store the
/// new JoinNonce counter, replace any existing session and apply the queue
/// policy.
///
/// Fails with `NotFound` (device or keys), `ReplayDetected`, or
/// `AddressConflict`; on failure nothing is written.
pub async fn commit_activation(db: &Database, commit: &ActivationCommit) -> Result<(), LorikeetError> {
    let commit = commit.clone();
    db.connection()
        .call(move |conn| -> Result<(), QueryError> {
            let a = &commit.activation;
            let dev_eui = a.dev_eui;
            let tx = conn.transaction()?;

            if !device_exists(&tx, dev_eui)? {
                return Err(LorikeetError::device_not_found(dev_eui).into());
            }
            if let Some(nonce) = commit.consumed_nonce {
                nonces::consume_in_tx(&tx, dev_eui, nonce)?;
            }
            if holder_of(&tx, a.dev_addr, Some(dev_eui))?.is_some() {
                return Err(LorikeetError::AddressConflict { dev_addr: a.dev_addr }.into());
            }
            if let Some(join_nonce) = commit.join_nonce {
                let updated = tx.execute(
                    "UPDATE device_keys SET join_nonce = ?2, updated_at = ?3 WHERE dev_eui = ?1",
                    params![dev_eui.to_string(), join_nonce, ts_to_sql(&a.activated_at)],
                )?;
                if updated == 0 {
                    return Err(LorikeetError::NotFound {
                        entity: "device keys",
                        key: dev_eui.to_string(),
                    }
                    .into());
                }
            }

            tx.execute(
                "DELETE FROM device_activation WHERE dev_eui = ?1",
                params![dev_eui.to_string()],
            )?;
            tx.execute(
                &format!(
                    "INSERT INTO device_activation ({ACTIVATION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    dev_eui.to_string(),
                    a.dev_addr.to_string(),
                    a.mode.to_string(),
                    a.mac_version.to_string(),
                    a.join_eui.map(|e| e.to_string()),
                    a.dev_nonce,
                    a.join_nonce,
                    a.keys.f_nwk_s_int_key.as_bytes().as_slice(),
                    a.keys.s_nwk_s_int_key.as_bytes().as_slice(),
                    a.keys.nwk_s_enc_key.as_bytes().as_slice(),
                    a.keys.app_s_key.as_bytes().as_slice(),
                    a.f_cnt_up,
                    a.n_f_cnt_down,
                    a.a_f_cnt_down,
                    a.last_acked_f_cnt_down,
                    ts_to_sql(&a.activated_at),
                ],
            )?;
            let touched = queue::apply_policy_in_tx(&tx, dev_eui, commit.queue_policy)?;
            tx.commit()?;
            debug!(%dev_eui, dev_addr = %a.dev_addr, queue_items = touched, "activation committed");
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove the session of a device and apply the queue policy.
/// Returns false, leaving the queue untouched, if there was no session.
pub async fn delete_activation(
    db: &Database,
    dev_eui: DevEui,
    queue_policy: QueuePolicy,
) -> Result<bool, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<bool, QueryError> {
            let tx = conn.transaction()?;
            let deleted = tx.execute(
                "DELETE FROM device_activation WHERE dev_eui = ?1",
                params![dev_eui.to_string()],
            )?;
            if deleted > 0 {
                queue::apply_policy_in_tx(&tx, dev_eui, queue_policy)?;
            }
            tx.commit()?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// True if a session other than `exclude`'s holds `dev_addr`.
pub async fn dev_addr_in_use(
    db: &Database,
    dev_addr: DevAddr,
    exclude: Option<DevEui>,
) -> Result<bool, LorikeetError> {
    db.connection()
        .call(move |conn| -> Result<bool, QueryError> {
            let tx = conn.transaction()?;
            let holder = holder_of(&tx, dev_addr, exclude)?;
            tx.commit()?;
            Ok(holder.is_some())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{setup_db, setup_device};
    use crate::queries::{keys, nonces};
    use chrono::Utc;
    use lorikeet_core::models::{ConsumedNonce, DeviceKeys};
    use lorikeet_core::{ActivationMode, AesKey, ErrorKind, MacVersion};

    fn session(dev_eui: DevEui, dev_addr: u32) -> DeviceActivation {
        let key = AesKey::from_bytes([0x42; 16]);
        DeviceActivation {
            dev_eui,
            dev_addr: DevAddr::from_u32(dev_addr),
            mode: ActivationMode::Otaa,
            mac_version: MacVersion::LoRaWAN1_0_3,
            join_eui: Some("0000000000000001".parse().unwrap()),
            dev_nonce: Some(1),
            join_nonce: Some(1),
            keys: SessionKeys {
                f_nwk_s_int_key: key.clone(),
                s_nwk_s_int_key: key.clone(),
                nwk_s_enc_key: key,
                app_s_key: AesKey::from_bytes([0x24; 16]),
            },
            f_cnt_up: 0,
            n_f_cnt_down: 0,
            a_f_cnt_down: 0,
            last_acked_f_cnt_down: None,
            activated_at: Utc::now(),
        }
    }

    fn commit(activation: DeviceActivation, dev_nonce: u16) -> ActivationCommit {
        ActivationCommit {
            consumed_nonce: Some(ConsumedNonce {
                join_eui: activation.join_eui.unwrap_or_default(),
                dev_nonce,
                allow_reuse: false,
            }),
            join_nonce: Some(u32::from(dev_nonce)),
            activation,
            queue_policy: QueuePolicy::Requeue,
        }
    }

    async fn with_keys(db: &Database, eui: &str) -> DevEui {
        let dev_eui = setup_device(db, eui).await;
        keys::create_keys(
            db,
            &DeviceKeys::new(dev_eui, AesKey::from_bytes([1; 16]), AesKey::from_bytes([2; 16])),
        )
        .await
        .unwrap();
        dev_eui
    }

    #[tokio::test]
    async fn commit_installs_session_nonce_and_join_nonce() {
        let (db, _dir) = setup_db().await;
        let eui = with_keys(&db, "0011223344556677").await;
        commit_activation(&db, &commit(session(eui, 0x2600_0001), 5)).await.unwrap();

        let stored = get_activation(&db, eui).await.unwrap().unwrap();
        assert_eq!(stored.dev_addr, DevAddr::from_u32(0x2600_0001));
        assert_eq!(stored.mode, ActivationMode::Otaa);
        assert_eq!(stored.mac_version, MacVersion::LoRaWAN1_0_3);
        assert_eq!(stored.keys.app_s_key, AesKey::from_bytes([0x24; 16]));
        assert_eq!(stored.last_acked_f_cnt_down, None);

        let join_eui = stored.join_eui.unwrap();
        assert!(nonces::is_dev_nonce_used(&db, eui, join_eui, 5).await.unwrap());
        assert_eq!(keys::get_keys(&db, eui).await.unwrap().unwrap().join_nonce, 5);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn replayed_commit_writes_nothing() {
        let (db, _dir) = setup_db().await;
        let eui = with_keys(&db, "0011223344556677").await;
        commit_activation(&db, &commit(session(eui, 0x2600_0001), 5)).await.unwrap();

        let err = commit_activation(&db, &commit(session(eui, 0x2600_0002), 5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReplayDetected);
        let stored = get_activation(&db, eui).await.unwrap().unwrap();
        assert_eq!(stored.dev_addr, DevAddr::from_u32(0x2600_0001));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn address_conflict_rolls_back_nonce() {
        let (db, _dir) = setup_db().await;
        let a = with_keys(&db, "0000000000000001").await;
        let b = with_keys(&db, "0000000000000002").await;
        commit_activation(&db, &commit(session(a, 0x2600_0001), 1)).await.unwrap();

        let err = commit_activation(&db, &commit(session(b, 0x2600_0001), 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AddressConflict);
        let join_eui = "0000000000000001".parse().unwrap();
        assert!(!nonces::is_dev_nonce_used(&db, b, join_eui, 1).await.unwrap());
        assert!(get_activation(&db, b).await.unwrap().is_none());

        assert!(dev_addr_in_use(&db, DevAddr::from_u32(0x2600_0001), None).await.unwrap());
        assert!(!dev_addr_in_use(&db, DevAddr::from_u32(0x2600_0001), Some(a)).await.unwrap());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reactivation_may_keep_its_own_address() {
        let (db, _dir) = setup_db().await;
        let eui = with_keys(&db, "0011223344556677").await;
        commit_activation(&db, &commit(session(eui, 0x2600_0001), 1)).await.unwrap();
        commit_activation(&db, &commit(session(eui, 0x2600_0001), 2)).await.unwrap();
        let stored = get_activation(&db, eui).await.unwrap().unwrap();
        assert_eq!(stored.join_nonce, Some(1));
        assert_eq!(keys::get_keys(&db, eui).await.unwrap().unwrap().join_nonce, 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (db, _dir) = setup_db().await;
        let eui = with_keys(&db, "0011223344556677").await;
        commit_activation(&db, &commit(session(eui, 0x2600_0001), 1)).await.unwrap();
        assert!(delete_activation(&db, eui, QueuePolicy::Requeue).await.unwrap());
        assert!(!delete_activation(&db, eui, QueuePolicy::Requeue).await.unwrap());
        assert!(get_activation(&db, eui).await.unwrap().is_none());
        db.close().await.unwrap();
    }
}

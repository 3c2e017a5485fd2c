// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities, plus the column
//! codecs they share.

pub mod activations;
pub mod devices;
pub mod keys;
pub mod nonces;
pub mod queue;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use lorikeet_core::{AesKey, DevEui, LorikeetError};
use rusqlite::types::Type;
use rusqlite::{Row, Transaction, params};

pub(crate) fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_err(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn ts_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn opt_ts_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => ts_from_row(row, idx).map(Some),
        None => Ok(None),
    }
}

/// Parse a hex/string column into any `FromStr` identifier.
pub(crate) fn parse_from_row<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = LorikeetError>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_err(idx, e))
}

pub(crate) fn opt_parse_from_row<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = LorikeetError>,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_from_row(row, idx).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn key_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<AesKey> {
    let bytes: Vec<u8> = row.get(idx)?;
    AesKey::from_slice(&bytes)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, Box::new(e)))
}

pub(crate) fn device_exists(tx: &Transaction<'_>, dev_eui: DevEui) -> rusqlite::Result<bool> {
    tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM device WHERE dev_eui = ?1)",
        params![dev_eui.to_string()],
        |row| row.get(0),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use lorikeet_core::DevEui;
    use lorikeet_core::models::Device;
    use tempfile::TempDir;

    use crate::database::Database;

    pub async fn setup_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    pub fn dev_eui(s: &str) -> DevEui {
        s.parse().unwrap()
    }

    pub async fn setup_device(db: &Database, eui: &str) -> DevEui {
        let dev_eui = dev_eui(eui);
        super::devices::create_device(db, &Device::new(dev_eui, format!("dev-{eui}"), "profile-1"))
            .await
            .unwrap();
        dev_eui
    }
}

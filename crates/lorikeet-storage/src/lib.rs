// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Lorikeet device-management service.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single
//! connection serialized through `tokio-rusqlite`, and typed operations for
//! devices, root keys, sessions, DevNonce history, and downlink queues.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;

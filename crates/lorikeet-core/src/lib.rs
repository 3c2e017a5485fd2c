// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Lorikeet device-management service.
//!
//! This crate provides the error type, LoRaWAN identifier and key primitives,
//! persisted record types, and the trait seams between the engine, the
//! storage backend, and the transport layer.

pub mod error;
pub mod models;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ErrorKind, LorikeetError};
pub use types::{
    ActivationMode, AesKey, DevAddr, DevAddrPrefix, DevEui, Eui64, HealthStatus, JoinEui,
    MacVersion, NetId,
};

pub use traits::{DeviceService, DeviceStore, EventLogAdapter, PluginAdapter};

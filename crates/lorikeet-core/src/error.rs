// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Lorikeet device-management core.

use strum::{Display, EnumString};
use thiserror::Error;

use crate::types::{DevAddr, Eui64};

/// The primary error type returned by every storage, engine, and service operation.
///
/// Each variant maps to exactly one [`ErrorKind`] so the transport layer can
/// translate failures into status codes without inspecting messages.
#[derive(Debug, Error)]
pub enum LorikeetError {
    /// The referenced device, key set, queue item, or other record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A record with the same key already exists.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// Malformed activation, queue, or record input.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A join-request nonce was presented a second time.
    #[error("replay detected: dev_nonce {dev_nonce} already used for dev_eui {dev_eui} / join_eui {join_eui}")]
    ReplayDetected {
        dev_eui: Eui64,
        join_eui: Eui64,
        dev_nonce: u16,
    },

    /// The DevAddr is bound to another device's active session.
    #[error("dev_addr {dev_addr} is already in use by another device")]
    AddressConflict { dev_addr: DevAddr },

    /// No free DevAddr could be found within the configured prefixes.
    #[error("no free dev_addr found after {attempts} attempts")]
    AddressSpaceExhausted { attempts: u32 },

    /// Root or session key material is missing or unusable.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The operation requires an active session but the device has none.
    #[error("device {dev_eui} is not activated")]
    NotActivated { dev_eui: Eui64 },

    /// The backing store failed (connection, query, or transaction failure).
    #[error("storage unavailable: {source}")]
    StorageUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, unparseable values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The service operation has no implementation.
    #[error("operation not implemented: {0}")]
    Unimplemented(&'static str),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Fieldless discriminant of [`LorikeetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidParameters,
    ReplayDetected,
    AddressConflict,
    AddressSpaceExhausted,
    InvalidKeyMaterial,
    NotActivated,
    StorageUnavailable,
    Config,
    Unimplemented,
    Internal,
}

impl LorikeetError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LorikeetError::NotFound { .. } => ErrorKind::NotFound,
            LorikeetError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            LorikeetError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            LorikeetError::ReplayDetected { .. } => ErrorKind::ReplayDetected,
            LorikeetError::AddressConflict { .. } => ErrorKind::AddressConflict,
            LorikeetError::AddressSpaceExhausted { .. } => ErrorKind::AddressSpaceExhausted,
            LorikeetError::InvalidKeyMaterial(_) => ErrorKind::InvalidKeyMaterial,
            LorikeetError::NotActivated { .. } => ErrorKind::NotActivated,
            LorikeetError::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            LorikeetError::Config(_) => ErrorKind::Config,
            LorikeetError::Unimplemented(_) => ErrorKind::Unimplemented,
            LorikeetError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for a missing device.
    pub fn device_not_found(dev_eui: Eui64) -> Self {
        LorikeetError::NotFound {
            entity: "device",
            key: dev_eui.to_string(),
        }
    }

    /// Wrap any error as a storage failure.
    pub fn storage<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        LorikeetError::StorageUnavailable {
            source: source.into(),
        }
    }
}

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Device activation and downlink-queue engine.
//!
//! The components share one [`DeviceStore`] and one [`DeviceLocks`] map.
//! Every mutating operation takes the device's lock, reads a snapshot, plans
//! the change in memory, and hands the store a single transactional write.
//! [`DeviceManager`] composes them behind the [`DeviceService`] interface.
//!
//! [`DeviceService`]: lorikeet_core::DeviceService

pub mod activation;
pub mod config;
pub mod events;
pub mod keys;
pub mod locks;
pub mod manager;
pub mod nonce;
pub mod queue;
pub mod registry;

use std::sync::Arc;

use lorikeet_core::DeviceStore;

pub use activation::ActivationEngine;
pub use config::EngineConfig;
pub use events::{EventLog, TracingEventLog};
pub use keys::KeyManager;
pub use locks::DeviceLocks;
pub use manager::DeviceManager;
pub use nonce::NonceTracker;
pub use queue::DownlinkQueueManager;
pub use registry::DeviceRegistry;

/// Store handle shared by all components.
pub type SharedStore = Arc<dyn DeviceStore>;

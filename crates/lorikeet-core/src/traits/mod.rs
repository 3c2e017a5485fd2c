// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions at the seams between the engine, storage, and transport.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod event_log;
pub mod service;
pub mod storage;

pub use adapter::PluginAdapter;
pub use event_log::EventLogAdapter;
pub use service::DeviceService;
pub use storage::DeviceStore;

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Lorikeet integration tests.
//!
//! # Components
//!
//! - [`TestHarness`] - a complete engine over a temporary SQLite database
//! - [`FaultyStore`] - a store wrapper that fails selected operations on demand
//! - [`RecordingEventLog`] - an event log backend that keeps entries in memory

pub mod event_log;
pub mod faulty_store;
pub mod harness;

pub use event_log::RecordingEventLog;
pub use faulty_store::{FaultyStore, StoreOp};
pub use harness::TestHarness;

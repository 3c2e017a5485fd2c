// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event log adapter trait.

use async_trait::async_trait;

use crate::error::LorikeetError;
use crate::models::LogEntry;
use crate::traits::adapter::PluginAdapter;

/// Sink for join and downlink exchange records.
///
/// Backends publish entries to wherever operators read them. A failing
/// backend never fails the exchange it describes.
#[async_trait]
pub trait EventLogAdapter: PluginAdapter {
    /// Publish one entry.
    async fn record(&self, entry: LogEntry) -> Result<(), LorikeetError>;
}

// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Event log backend that keeps every entry in memory.

use async_trait::async_trait;
use tokio::sync::Mutex;

use lorikeet_core::models::{EventKind, LogEntry};
use lorikeet_core::{EventLogAdapter, HealthStatus, LorikeetError, PluginAdapter};

#[derive(Default)]
pub struct RecordingEventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl RecordingEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first.
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn of_kind(&self, kind: EventKind) -> Vec<LogEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|entry| entry.kind == kind)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

#[async_trait]
impl PluginAdapter for RecordingEventLog {
    fn name(&self) -> &str {
        "recording"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, LorikeetError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LorikeetError> {
        Ok(())
    }
}

#[async_trait]
impl EventLogAdapter for RecordingEventLog {
    async fn record(&self, entry: LogEntry) -> Result<(), LorikeetError> {
        self.entries.lock().await.push(entry);
        Ok(())
    }
}

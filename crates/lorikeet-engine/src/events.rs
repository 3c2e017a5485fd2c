// SPDX-FileCopyrightText: 2026 Lorikeet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Join and downlink event log.
//!
//! Components describe each exchange as a [`LogEntry`] and hand it to an
//! [`EventLogAdapter`]. Without a configured backend, entries go to `tracing`.

use std::sync::Arc;

use async_trait::async_trait;
use lorikeet_core::models::{FrameStatusResult, LogEntry};
use lorikeet_core::{EventLogAdapter, HealthStatus, LorikeetError, PluginAdapter};
use tracing::{error, info, warn};

/// Default backend that writes entries as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

#[async_trait]
impl PluginAdapter for TracingEventLog {
    fn name(&self) -> &str {
        "tracing"
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
impl EventLogAdapter for TracingEventLog {
    async fn record(&self, entry: LogEntry) -> Result<(), LorikeetError> {
        let dev_addr = entry.dev_addr.map(|a| a.to_string()).unwrap_or_default();
        match entry.frame_status.result {
            FrameStatusResult::Ok => info!(
                kind = %entry.kind,
                dev_eui = %entry.dev_eui,
                dev_addr = %dev_addr,
                dev_nonce = entry.dev_nonce,
                f_port = entry.f_port,
                f_cnt_down = entry.f_cnt_down,
                "exchange ok"
            ),
            result => warn!(
                kind = %entry.kind,
                result = %result,
                dev_eui = %entry.dev_eui,
                known_device = entry.known_device,
                dev_addr = %dev_addr,
                dev_nonce = entry.dev_nonce,
                f_cnt_down = entry.f_cnt_down,
                error = %entry.frame_status.error_desc,
                "exchange not ok"
            ),
        }
        Ok(())
    }
}

/// Handle the components publish through. Publishing never fails.
#[derive(Clone)]
pub struct EventLog {
    backend: Arc<dyn EventLogAdapter>,
}

impl EventLog {
    pub fn new(backend: Arc<dyn EventLogAdapter>) -> Self {
        Self { backend }
    }

    pub(crate) async fn send(&self, entry: LogEntry) {
        if let Err(e) = self.backend.record(entry).await {
            error!(backend = self.backend.name(), error = %e, "event log publish failed");
        }
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(Arc::new(TracingEventLog))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorikeet_core::DevEui;
    use lorikeet_core::models::EventKind;
    use tracing_test::traced_test;

    struct Broken;

    #[async_trait]
    impl PluginAdapter for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn version(&self) -> semver::Version {
            semver::Version::new(0, 0, 1)
        }

        async fn health_check(&self) -> Result<HealthStatus, LorikeetError> {
            Ok(HealthStatus::Unhealthy("down".into()))
        }

        async fn shutdown(&self) -> Result<(), LorikeetError> {
            Ok(())
        }
    }

    #[async_trait]
    impl EventLogAdapter for Broken {
        async fn record(&self, _entry: LogEntry) -> Result<(), LorikeetError> {
            Err(LorikeetError::Internal("sink offline".into()))
        }
    }

    fn dev_eui() -> DevEui {
        "0011223344556677".parse().unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn tracing_backend_reports_by_status() {
        let log = EventLog::default();
        log.send(LogEntry::new(EventKind::Join, dev_eui()).dev_nonce(3))
            .await;
        log.send(
            LogEntry::new(EventKind::Join, dev_eui())
                .dev_nonce(3)
                .status(FrameStatusResult::Nok, "dev_nonce 3 already used"),
        )
        .await;
        assert!(logs_contain("exchange ok"));
        assert!(logs_contain("exchange not ok"));
        assert!(logs_contain("dev_nonce 3 already used"));
    }

    #[tokio::test]
    #[traced_test]
    async fn failing_backend_is_swallowed() {
        let log = EventLog::new(Arc::new(Broken));
        log.send(LogEntry::new(EventKind::Ack, dev_eui())).await;
        assert!(logs_contain("event log publish failed"));
    }
}

//! Default alert sink: forwards alerts to `tracing`.

use std::collections::HashSet;

use parking_lot::Mutex;
use peerbuf_core::alert::{Alert, AlertLevel, AlertSink};

/// Logs each alert; an unrepeatable alert is logged once per message.
#[derive(Debug, Default)]
pub struct TracingAlertSink {
    seen: Mutex<HashSet<String>>,
}

impl TracingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertSink for TracingAlertSink {
    fn alert(&self, alert: Alert) {
        if !alert.repeatable && !self.seen.lock().insert(alert.message.clone()) {
            return;
        }
        match alert.level {
            AlertLevel::Information => tracing::info!(target: "peerbuf::alert", "{}", alert.message),
            AlertLevel::Warning => tracing::warn!(target: "peerbuf::alert", "{}", alert.message),
            AlertLevel::Error => tracing::error!(target: "peerbuf::alert", "{}", alert.message),
        }
    }
}

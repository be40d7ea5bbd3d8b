//! Operator alert interface.
//!
//! The pool raises alerts for conditions an operator should see once (native
//! memory exhausted, slice space exhausted). Where they end up is up to the
//! application; `peerbuf-mem` ships a `tracing`-backed sink.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Information,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    /// Unrepeatable alerts should be shown at most once per process.
    pub repeatable: bool,
    pub message: String,
}

impl Alert {
    pub fn unrepeatable(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            repeatable: false,
            message: message.into(),
        }
    }

    pub fn repeatable(level: AlertLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            repeatable: true,
            message: message.into(),
        }
    }
}

/// Destination for operator alerts.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: Alert);
}

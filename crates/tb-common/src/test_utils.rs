//! Test doubles shared by the workspace's test suites.
//!
//! Enabled with the `test-utils` feature.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::date::{date_from_millis, DateProvider};
use crate::telemetry::Telemetry;

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct RelativeDateProvider {
    now: Mutex<DateTime<Utc>>,
}

impl RelativeDateProvider {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at a fixed, recognisable instant.
    pub fn at_millis(millis: u64) -> Self {
        Self::new(date_from_millis(millis))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for RelativeDateProvider {
    fn default() -> Self {
        Self::at_millis(1_700_000_000_000)
    }
}

impl DateProvider for RelativeDateProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A message captured by [`TelemetryMock`].
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    Error { message: String, cause: Option<String> },
    Debug(String),
    Metric { name: String, attributes: serde_json::Value },
}

/// Telemetry sink recording every message.
#[derive(Debug, Default)]
pub struct TelemetryMock {
    messages: Mutex<Vec<TelemetryMessage>>,
}

impl TelemetryMock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<TelemetryMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                TelemetryMessage::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    /// Attributes of every metric emitted under `name`.
    pub fn metrics(&self, name: &str) -> Vec<serde_json::Value> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                TelemetryMessage::Metric {
                    name: metric,
                    attributes,
                } if metric == name => Some(attributes),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn push(&self, message: TelemetryMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}

impl Telemetry for TelemetryMock {
    fn error(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        self.push(TelemetryMessage::Error {
            message: message.to_string(),
            cause: error.map(|e| e.to_string()),
        });
    }

    fn debug(&self, message: &str) {
        self.push(TelemetryMessage::Debug(message.to_string()));
    }

    fn metric(&self, name: &str, attributes: serde_json::Value) {
        self.push(TelemetryMessage::Metric {
            name: name.to_string(),
            attributes,
        });
    }
}

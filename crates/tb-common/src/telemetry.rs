//! Internal telemetry sink.
//!
//! The storage and upload pipeline reports every failure it swallows through
//! this interface. Implementations must be fire-and-forget: never block on
//! I/O, never panic.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Metric name emitted when a batch file is deleted.
pub const BATCH_DELETED_METRIC: &str = "Batch Deleted";

/// Metric name emitted when a batch file stops accepting writes.
pub const BATCH_CLOSED_METRIC: &str = "Batch Closed";

/// Sink for SDK-internal diagnostics.
pub trait Telemetry: Send + Sync {
    /// Report an error. `error` carries the underlying cause, if any.
    fn error(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>);

    /// Report a debug message.
    fn debug(&self, message: &str);

    /// Report a named metric with structured attributes.
    fn metric(&self, name: &str, attributes: serde_json::Value) {
        let _ = (name, attributes);
    }
}

/// Why a batch file was removed from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchRemovalReason {
    /// The intake answered with a final status code.
    IntakeCode { response_code: u16 },
    /// Confirmed delivered without a status code.
    Delivered,
    /// Older than the maximum age for read.
    Obsolete,
    /// Directory exceeded its size budget.
    Purged,
    /// The upload request could not be built.
    Invalid,
    /// Deleted by a synchronous flush.
    Flushed,
    /// Unauthorized data dropped after consent was refused or abandoned.
    ConsentRevoked,
    /// Explicit data wipe requested by the application.
    Cleared,
}

impl BatchRemovalReason {
    /// Stable label used in metric attributes.
    pub fn label(&self) -> String {
        match self {
            BatchRemovalReason::IntakeCode { response_code } => {
                format!("intake-code-{}", response_code)
            }
            BatchRemovalReason::Delivered => "delivered".to_string(),
            BatchRemovalReason::Obsolete => "obsolete".to_string(),
            BatchRemovalReason::Purged => "purged".to_string(),
            BatchRemovalReason::Invalid => "invalid".to_string(),
            BatchRemovalReason::Flushed => "flushed".to_string(),
            BatchRemovalReason::ConsentRevoked => "consent-revoked".to_string(),
            BatchRemovalReason::Cleared => "cleared".to_string(),
        }
    }

    /// Flushes and explicit wipes are not interesting for delivery metrics.
    pub fn include_in_metric(&self) -> bool {
        !matches!(
            self,
            BatchRemovalReason::Flushed | BatchRemovalReason::Cleared
        )
    }
}

impl std::fmt::Display for BatchRemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Default sink forwarding to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn error(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        match error {
            Some(cause) => error!(target: "tb::telemetry", error = %cause, "{}", message),
            None => error!(target: "tb::telemetry", "{}", message),
        }
    }

    fn debug(&self, message: &str) {
        debug!(target: "tb::telemetry", "{}", message);
    }

    fn metric(&self, name: &str, attributes: serde_json::Value) {
        info!(target: "tb::telemetry", metric = name, attributes = %attributes, "metric");
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopTelemetry;

impl Telemetry for NopTelemetry {
    fn error(&self, _message: &str, _error: Option<&(dyn std::error::Error + 'static)>) {}

    fn debug(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removal_reason_labels() {
        assert_eq!(
            BatchRemovalReason::IntakeCode { response_code: 202 }.label(),
            "intake-code-202"
        );
        assert_eq!(BatchRemovalReason::Obsolete.label(), "obsolete");
        assert_eq!(BatchRemovalReason::Delivered.label(), "delivered");
        assert_eq!(BatchRemovalReason::Purged.to_string(), "purged");
        assert_eq!(BatchRemovalReason::ConsentRevoked.label(), "consent-revoked");
    }

    #[test]
    fn test_removal_reason_metric_inclusion() {
        assert!(BatchRemovalReason::Purged.include_in_metric());
        assert!(BatchRemovalReason::Invalid.include_in_metric());
        assert!(!BatchRemovalReason::Flushed.include_in_metric());
        assert!(!BatchRemovalReason::Cleared.include_in_metric());
    }

    #[test]
    fn test_removal_reason_serialization() {
        let reason = BatchRemovalReason::IntakeCode { response_code: 413 };
        let json = serde_json::to_string(&reason).unwrap();
        assert!(json.contains("intake_code"));
        let back: BatchRemovalReason = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reason);
    }

    #[test]
    fn test_tracing_telemetry_never_panics_without_subscriber() {
        let telemetry = TracingTelemetry;
        let cause = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        telemetry.error("failed to create file", Some(&cause));
        telemetry.error("no cause", None);
        telemetry.debug("hello");
        telemetry.metric(BATCH_DELETED_METRIC, serde_json::json!({"reason": "purged"}));
    }
}

//! Tracking consent values.

use serde::{Deserialize, Serialize};

/// User-granted permission state gating whether telemetry may be persisted
/// and uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingConsent {
    /// Data is collected but parked until the user decides.
    Pending,
    /// Data is collected and uploaded.
    Granted,
    /// Data is discarded.
    NotGranted,
}

impl TrackingConsent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingConsent::Pending => "pending",
            TrackingConsent::Granted => "granted",
            TrackingConsent::NotGranted => "not_granted",
        }
    }
}

impl std::fmt::Display for TrackingConsent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TrackingConsent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TrackingConsent::Pending),
            "granted" => Ok(TrackingConsent::Granted),
            "not_granted" | "notgranted" | "not-granted" | "denied" => {
                Ok(TrackingConsent::NotGranted)
            }
            _ => Err(format!("unknown tracking consent: {}", s)),
        }
    }
}

//! Telemetry buffer common types.
//!
//! This crate provides the vocabulary shared by the storage and upload crates:
//! - Tracking consent values
//! - The internal telemetry sink and batch removal reasons
//! - An injectable clock
//! - A reader-writer guarded value for shared state
//! - Performance presets and SDK configuration
//! - Logging bootstrap on top of `tracing-subscriber`

pub mod config;
pub mod consent;
pub mod date;
pub mod error;
pub mod lock;
pub mod logging;
pub mod telemetry;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{PerformancePreset, PerformancePresetOverride, SdkConfig};
pub use consent::TrackingConsent;
pub use date::{DateProvider, SystemDateProvider};
pub use error::{Error, Result};
pub use lock::ReadWriteLock;
pub use telemetry::{BatchRemovalReason, NopTelemetry, Telemetry, TracingTelemetry};

//! Upload side of the telemetry buffer.
//!
//! Pulls batches out of `tb-storage`, frames them into a request body,
//! optionally compresses it and hands it to a host-provided [`Transport`].
//! Batches are deleted once the intake gives a final answer and released
//! for a later cycle when it asks for a retry.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tb_common::{PerformancePreset, SystemDateProvider, TrackingConsent, TracingTelemetry};
//! use tb_storage::{ConsentGate, FeatureStorage};
//! use tb_upload::{BatchFormatter, Compression, DataFormat, UploadRequest, UploadStatus, UploadWorker};
//!
//! let preset = PerformancePreset::default();
//! let storage = FeatureStorage::new(
//!     "logs",
//!     std::path::Path::new("/var/tmp/telemetry"),
//!     preset.clone(),
//!     Arc::new(ConsentGate::new(TrackingConsent::Granted)),
//!     Arc::new(SystemDateProvider),
//!     Arc::new(TracingTelemetry),
//! )?;
//!
//! let transport = |request: &UploadRequest| -> tb_upload::Result<UploadStatus> {
//!     // POST request.body with request.content_encoding
//!     Ok(UploadStatus::from_response_code(202))
//! };
//! let worker = UploadWorker::new(
//!     "logs",
//!     storage.reader(),
//!     BatchFormatter::new(DataFormat::json_array(), Compression::Deflate),
//!     Arc::new(transport),
//!     &preset,
//!     Arc::new(TracingTelemetry),
//! );
//! worker.spawn()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod delay;
pub mod error;
pub mod format;
pub mod transport;
pub mod worker;

pub use delay::DataUploadDelay;
pub use error::{Result, UploadError, UploadFailure};
pub use format::{BatchFormatter, Compression, DataFormat};
pub use transport::{Transport, UploadRequest, UploadStatus};
pub use worker::{CycleReport, UploadWorker};

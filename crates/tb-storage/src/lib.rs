//! Consent-aware durable buffering of telemetry records.
//!
//! Records are appended to flat batch files, one directory per consent
//! state, and read back batch by batch for upload:
//!
//! ```text
//! producers ──► Writer ──► ConsentGate ──► WorkQueue ──► FilesOrchestrator ──► <dir>/<ms-timestamp>
//!                                                                                      │
//! uploader ◄── Batch ◄── Reader ◄── FilesOrchestrator (oldest readable file) ◄─────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tb_common::{PerformancePreset, SystemDateProvider, TrackingConsent, TracingTelemetry};
//! use tb_storage::{ConsentGate, FeatureStorage};
//!
//! let gate = Arc::new(ConsentGate::new(TrackingConsent::Pending));
//! let storage = FeatureStorage::new(
//!     "logs",
//!     std::path::Path::new("/var/tmp/telemetry"),
//!     PerformancePreset::default(),
//!     gate.clone(),
//!     Arc::new(SystemDateProvider),
//!     Arc::new(TracingTelemetry),
//! )?;
//!
//! storage.writer().write(br#"{"message":"hello"}"#.to_vec());
//! gate.change_consent(TrackingConsent::Granted);
//!
//! if let Some(batch) = storage.reader().read_next_batch() {
//!     // hand batch.records() to the transport, then:
//!     storage.reader().mark_batch_as_read(batch);
//! }
//! # Ok::<(), tb_storage::StorageError>(())
//! ```

pub mod consent;
pub mod directory;
pub mod encryption;
pub mod error;
pub mod event;
pub mod file;
pub mod migrator;
pub mod orchestrator;
pub mod queue;
pub mod reader;
pub mod storage;
pub mod tlv;
pub mod writer;

pub use consent::{ConsentGate, ConsentSubscriber, SubscriptionId};
pub use directory::Directory;
pub use encryption::DataEncryption;
pub use error::{Result, StorageError};
pub use event::{Event, EventMapper, MappedEvent};
pub use file::BatchFile;
pub use migrator::{resolve_migration, DataMigrator, MigrationAction, MigrationReport};
pub use orchestrator::{FilesOrchestrator, MetricsContext};
pub use queue::WorkQueue;
pub use reader::{Batch, BatchHandle, Reader};
pub use storage::{FeatureStorage, StorageOptions};
pub use writer::Writer;

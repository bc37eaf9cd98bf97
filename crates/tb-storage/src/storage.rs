//! Per-feature storage: the two directories, their orchestrators, the write
//! queue, and the writer, reader and migrator wired together.
//!
//! ```text
//! <root>/<feature>/
//! ├── unauthorized/   records written while consent is pending
//! └── authorized/     records approved for upload
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tb_common::{
    BatchRemovalReason, DateProvider, PerformancePreset, Telemetry, TrackingConsent,
};
use tracing::info;

use crate::consent::{ConsentGate, SubscriptionId};
use crate::directory::Directory;
use crate::encryption::DataEncryption;
use crate::error::{Result, StorageError};
use crate::event::EventMapper;
use crate::file::BatchFile;
use crate::migrator::DataMigrator;
use crate::orchestrator::{FilesOrchestrator, MetricsContext};
use crate::queue::WorkQueue;
use crate::reader::Reader;
use crate::writer::Writer;

pub const UNAUTHORIZED_DIRECTORY: &str = "unauthorized";
pub const AUTHORIZED_DIRECTORY: &str = "authorized";

/// Optional collaborators of a [`FeatureStorage`].
#[derive(Clone, Default)]
pub struct StorageOptions {
    pub encryption: Option<Arc<dyn DataEncryption>>,
    pub event_mapper: EventMapper,
}

/// Durable buffer of one feature's records.
///
/// Dropping it unsubscribes from the consent gate and drains the write
/// queue.
pub struct FeatureStorage {
    feature: String,
    root: PathBuf,
    gate: Arc<ConsentGate>,
    subscription: SubscriptionId,
    queue: Arc<WorkQueue>,
    authorized: Arc<FilesOrchestrator>,
    unauthorized: Arc<FilesOrchestrator>,
    writer: Writer,
    reader: Reader,
    telemetry: Arc<dyn Telemetry>,
}

impl FeatureStorage {
    pub fn new(
        feature: &str,
        root: &Path,
        preset: PerformancePreset,
        gate: Arc<ConsentGate>,
        date_provider: Arc<dyn DateProvider>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Result<Self> {
        Self::with_options(
            feature,
            root,
            preset,
            gate,
            date_provider,
            telemetry,
            StorageOptions::default(),
        )
    }

    /// Open the feature's directories and drop unauthorized data left by a
    /// previous process.
    pub fn with_options(
        feature: &str,
        root: &Path,
        preset: PerformancePreset,
        gate: Arc<ConsentGate>,
        date_provider: Arc<dyn DateProvider>,
        telemetry: Arc<dyn Telemetry>,
        options: StorageOptions,
    ) -> Result<Self> {
        validate_feature_name(feature)?;
        preset.validate()?;

        let feature_root = root.join(feature);
        let orchestrator = |name: &str, consent: TrackingConsent| -> Result<Arc<FilesOrchestrator>> {
            let directory = Directory::create(feature_root.join(name))?;
            Ok(Arc::new(
                FilesOrchestrator::new(
                    directory,
                    preset.clone(),
                    Arc::clone(&date_provider),
                    Arc::clone(&telemetry),
                )
                .with_metrics(MetricsContext {
                    track: feature.to_string(),
                    consent,
                }),
            ))
        };
        let unauthorized = orchestrator(UNAUTHORIZED_DIRECTORY, TrackingConsent::Pending)?;
        let authorized = orchestrator(AUTHORIZED_DIRECTORY, TrackingConsent::Granted)?;

        let queue = WorkQueue::new(feature)?;
        let migrator = DataMigrator::new(
            Arc::clone(&queue),
            Arc::clone(&unauthorized),
            Arc::clone(&authorized),
            Arc::clone(&telemetry),
        );
        let cleanup = migrator.clone();
        let cleared = queue.sync(move || cleanup.clear_unauthorized())?;
        let subscription = gate.subscribe(Arc::new(migrator));

        let mut writer = Writer::new(
            Arc::clone(&gate),
            Arc::clone(&queue),
            Arc::clone(&authorized),
            Arc::clone(&unauthorized),
            Arc::clone(&telemetry),
        )
        .with_event_mapper(options.event_mapper);
        let mut reader = Reader::new(Arc::clone(&authorized), Arc::clone(&telemetry));
        if let Some(encryption) = options.encryption {
            writer = writer.with_encryption(Arc::clone(&encryption));
            reader = reader.with_encryption(encryption);
        }

        info!(
            target: "tb_storage",
            feature,
            root = %feature_root.display(),
            abandoned_batches = cleared.deleted,
            "feature storage ready"
        );

        Ok(FeatureStorage {
            feature: feature.to_string(),
            root: feature_root,
            gate,
            subscription,
            queue,
            authorized,
            unauthorized,
            writer,
            reader,
            telemetry,
        })
    }

    pub fn feature(&self) -> &str {
        &self.feature
    }

    /// `<root>/<feature>`.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn consent_gate(&self) -> &Arc<ConsentGate> {
        &self.gate
    }

    pub fn writer(&self) -> Writer {
        self.writer.clone()
    }

    pub fn reader(&self) -> Reader {
        self.reader.clone()
    }

    /// Wait until every write submitted so far is on disk.
    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }

    /// Delete all buffered data in both directories, after pending writes.
    pub fn clear_all_data(&self) {
        let unauthorized = Arc::clone(&self.unauthorized);
        let authorized = Arc::clone(&self.authorized);
        let cleared = self.queue.sync(move || {
            unauthorized.delete_all(BatchRemovalReason::Cleared)
                + authorized.delete_all(BatchRemovalReason::Cleared)
        });
        match cleared {
            Ok(count) => info!(target: "tb_storage", feature = %self.feature, count, "cleared all data"),
            Err(e) => self.telemetry.error("Failed to clear data", Some(&e)),
        }
    }

    /// Make files readable regardless of their age.
    pub fn set_ignore_files_age_when_reading(&self, ignore: bool) {
        self.authorized.set_ignore_files_age_when_reading(ignore);
        self.unauthorized.set_ignore_files_age_when_reading(ignore);
    }

    pub fn authorized_files(&self) -> Result<Vec<BatchFile>> {
        self.authorized.files()
    }

    pub fn unauthorized_files(&self) -> Result<Vec<BatchFile>> {
        self.unauthorized.files()
    }

    pub fn authorized_directory(&self) -> &Directory {
        self.authorized.directory()
    }

    pub fn unauthorized_directory(&self) -> &Directory {
        self.unauthorized.directory()
    }

    /// Bytes on disk across both directories.
    pub fn disk_usage(&self) -> Result<u64> {
        Ok(self.authorized.directory_size()? + self.unauthorized.directory_size()?)
    }
}

impl Drop for FeatureStorage {
    fn drop(&mut self) {
        self.gate.unsubscribe(self.subscription);
        self.queue.shutdown();
    }
}

impl std::fmt::Debug for FeatureStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureStorage")
            .field("feature", &self.feature)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn validate_feature_name(feature: &str) -> Result<()> {
    let invalid = feature.is_empty()
        || feature == "."
        || feature == ".."
        || feature.contains(['/', '\\'])
        || feature.chars().any(char::is_control);
    if invalid {
        return Err(StorageError::InvalidFeatureName(feature.to_string()));
    }
    Ok(())
}

//! Moves or drops pending data when tracking consent is resolved.
//!
//! | previous | new         | action                                   |
//! |----------|-------------|------------------------------------------|
//! | pending  | not granted | delete every unauthorized file           |
//! | pending  | granted     | move unauthorized files to authorized    |
//! | other    |             | nothing                                  |
//!
//! Migration runs on the feature's work queue, after every write submitted
//! before the consent change, and the consent change waits for it.

use std::sync::Arc;

use tb_common::{BatchRemovalReason, Telemetry, TrackingConsent};
use tracing::info;

use crate::consent::ConsentSubscriber;
use crate::orchestrator::FilesOrchestrator;
use crate::queue::WorkQueue;

/// What a consent transition does to stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationAction {
    None,
    DeleteUnauthorized,
    MoveUnauthorizedToAuthorized,
}

/// Decide the migration for a consent transition.
pub fn resolve_migration(previous: TrackingConsent, new: TrackingConsent) -> MigrationAction {
    match (previous, new) {
        (TrackingConsent::Pending, TrackingConsent::NotGranted) => {
            MigrationAction::DeleteUnauthorized
        }
        (TrackingConsent::Pending, TrackingConsent::Granted) => {
            MigrationAction::MoveUnauthorizedToAuthorized
        }
        _ => MigrationAction::None,
    }
}

/// Outcome of one migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub moved: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Executes migrations between one feature's two directories.
#[derive(Clone)]
pub struct DataMigrator {
    queue: Arc<WorkQueue>,
    unauthorized: Arc<FilesOrchestrator>,
    authorized: Arc<FilesOrchestrator>,
    telemetry: Arc<dyn Telemetry>,
}

impl DataMigrator {
    pub fn new(
        queue: Arc<WorkQueue>,
        unauthorized: Arc<FilesOrchestrator>,
        authorized: Arc<FilesOrchestrator>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        DataMigrator {
            queue,
            unauthorized,
            authorized,
            telemetry,
        }
    }

    /// Run `action` on the calling thread.
    ///
    /// Must not race with writes; [`DataMigrator::migrate_on_queue`] is the
    /// safe entry point.
    pub fn migrate(&self, action: MigrationAction) -> MigrationReport {
        match action {
            MigrationAction::None => MigrationReport::default(),
            MigrationAction::DeleteUnauthorized => {
                self.delete_unauthorized(BatchRemovalReason::ConsentRevoked)
            }
            MigrationAction::MoveUnauthorizedToAuthorized => self.move_unauthorized(),
        }
    }

    /// Run `action` on the work queue and wait for it.
    pub fn migrate_on_queue(&self, action: MigrationAction) -> MigrationReport {
        if action == MigrationAction::None {
            return MigrationReport::default();
        }
        let migrator = self.clone();
        match self.queue.sync(move || migrator.migrate(action)) {
            Ok(report) => {
                info!(
                    target: "tb_storage",
                    queue = self.queue.label(),
                    ?action,
                    moved = report.moved,
                    deleted = report.deleted,
                    failed = report.failed,
                    "data migration finished"
                );
                report
            }
            Err(e) => {
                self.telemetry.error("Failed to run data migration", Some(&e));
                MigrationReport::default()
            }
        }
    }

    /// Drop unauthorized data left over by a previous process.
    pub fn clear_unauthorized(&self) -> MigrationReport {
        self.delete_unauthorized(BatchRemovalReason::Cleared)
    }

    fn delete_unauthorized(&self, reason: BatchRemovalReason) -> MigrationReport {
        let before = match self.unauthorized.files() {
            Ok(files) => files.len(),
            Err(e) => {
                self.telemetry
                    .error("Failed to list unauthorized files", Some(&e));
                return MigrationReport::default();
            }
        };
        let deleted = self.unauthorized.delete_all(reason);
        MigrationReport {
            moved: 0,
            deleted,
            failed: before.saturating_sub(deleted),
        }
    }

    fn move_unauthorized(&self) -> MigrationReport {
        let mut report = MigrationReport::default();
        self.unauthorized.seal_current();

        let files = match self.unauthorized.files() {
            Ok(files) => files,
            Err(e) => {
                self.telemetry
                    .error("Failed to list unauthorized files", Some(&e));
                return report;
            }
        };
        for file in files {
            match self
                .unauthorized
                .directory()
                .move_file(&file, self.authorized.directory())
            {
                Ok(_) => {
                    self.unauthorized.forget(&file);
                    report.moved += 1;
                }
                Err(e) => {
                    self.telemetry.error(
                        &format!("Failed to move batch file {}", file.name()),
                        Some(&e),
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl ConsentSubscriber for DataMigrator {
    fn consent_changed(&self, previous: TrackingConsent, current: TrackingConsent) {
        self.migrate_on_queue(resolve_migration(previous, current));
    }
}

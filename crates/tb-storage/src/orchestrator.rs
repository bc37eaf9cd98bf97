//! File orchestration for one storage directory.
//!
//! The orchestrator owns every decision about the files of its directory:
//! - which file the next record is appended to, and when to rotate
//! - which file may be read next, and the read markers on checked-out files
//! - eviction of obsolete files and purging when over the size budget
//!
//! ```text
//!            get_writable_file                get_readable_file
//! writer ───────────────────► [writable] ──seal──► [sealed] ──mark──► [reading]
//!                                                     │                   │
//!                              purge / obsolete ◄─────┘     consumed ◄────┘
//! ```
//!
//! All state sits behind one mutex; every operation is short and does at
//! most a directory listing plus a few metadata calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tb_common::date::millis_since_epoch;
use tb_common::telemetry::{BATCH_CLOSED_METRIC, BATCH_DELETED_METRIC};
use tb_common::{BatchRemovalReason, DateProvider, PerformancePreset, Telemetry, TrackingConsent};
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::error::{Result, StorageError};
use crate::file::BatchFile;

/// Labels attached to the batch metrics of one orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsContext {
    /// Feature name reported as the metric track.
    pub track: String,
    /// Consent the directory stands for.
    pub consent: TrackingConsent,
}

#[derive(Debug)]
struct WritableFile {
    file: BatchFile,
    objects: u64,
    approximate_size: u64,
    last_write: DateTime<Utc>,
    group_key: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    writable: Option<WritableFile>,
    reading: HashSet<BatchFile>,
    /// Last write time of files sealed by this process.
    sealed_at: HashMap<BatchFile, DateTime<Utc>>,
}

impl State {
    fn is_writable(&self, file: &BatchFile) -> bool {
        self.writable.as_ref().map_or(false, |w| &w.file == file)
    }

    fn is_protected(&self, file: &BatchFile) -> bool {
        self.is_writable(file) || self.reading.contains(file)
    }

    fn forget(&mut self, file: &BatchFile) {
        self.reading.remove(file);
        self.sealed_at.remove(file);
        if self.is_writable(file) {
            self.writable = None;
        }
    }
}

/// Orchestrates the batch files of a single directory.
pub struct FilesOrchestrator {
    directory: Directory,
    preset: PerformancePreset,
    date_provider: Arc<dyn DateProvider>,
    telemetry: Arc<dyn Telemetry>,
    metrics: Option<MetricsContext>,
    state: Mutex<State>,
    ignore_files_age_when_reading: AtomicBool,
}

impl FilesOrchestrator {
    pub fn new(
        directory: Directory,
        preset: PerformancePreset,
        date_provider: Arc<dyn DateProvider>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        FilesOrchestrator {
            directory,
            preset,
            date_provider,
            telemetry,
            metrics: None,
            state: Mutex::new(State::default()),
            ignore_files_age_when_reading: AtomicBool::new(false),
        }
    }

    /// Report "Batch Deleted" and "Batch Closed" metrics under these labels.
    pub fn with_metrics(mut self, metrics: MetricsContext) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn preset(&self) -> &PerformancePreset {
        &self.preset
    }

    // ---- writable files ----

    /// File to append a block of `write_size` bytes to.
    ///
    /// Reuses the current file while it exists, is young enough, has room
    /// for the block and is under the record count limit. Otherwise the
    /// current file is sealed and a new one created. Runs eviction first.
    pub fn get_writable_file(&self, write_size: u64) -> Result<BatchFile> {
        self.get_writable_file_for_group(write_size, None)
    }

    /// Like [`FilesOrchestrator::get_writable_file`], additionally rotating
    /// whenever `group_key` differs from the key the current file was opened
    /// with.
    pub fn get_writable_file_for_group(
        &self,
        write_size: u64,
        group_key: Option<&str>,
    ) -> Result<BatchFile> {
        self.validate(write_size)?;
        let now = self.date_provider.now();
        let mut state = self.lock();
        self.select_writable(&mut state, write_size, group_key, now)
    }

    /// Select the writable file for `block` and append it in one step.
    ///
    /// The state lock is held across the append, so a concurrent
    /// [`FilesOrchestrator::get_readable_file`] never seals and hands out the
    /// file between selection and write.
    pub fn append(&self, block: &[u8], group_key: Option<&str>) -> Result<BatchFile> {
        let write_size = block.len() as u64;
        self.validate(write_size)?;
        let now = self.date_provider.now();
        let mut state = self.lock();
        let file = self.select_writable(&mut state, write_size, group_key, now)?;
        file.append(block)?;
        Ok(file)
    }

    fn select_writable(
        &self,
        state: &mut State,
        write_size: u64,
        group_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BatchFile> {
        self.evict(state, now);

        if let Some(current) = state.writable.as_mut() {
            if self.can_reuse(current, write_size, group_key, now) {
                current.objects += 1;
                current.approximate_size += write_size;
                current.last_write = now;
                return Ok(current.file.clone());
            }
        }

        let group_changed = state
            .writable
            .as_ref()
            .map_or(false, |w| w.group_key.as_deref() != group_key);
        self.seal(state, now, group_changed);
        self.create_writable(state, write_size, group_key, now)
    }

    /// Always start a new file, sealing the current one.
    pub fn get_new_writable_file(&self, write_size: u64) -> Result<BatchFile> {
        self.validate(write_size)?;
        let now = self.date_provider.now();
        let mut state = self.lock();
        self.evict(&mut state, now);
        self.seal(&mut state, now, true);
        self.create_writable(&mut state, write_size, None, now)
    }

    /// Stop appending to the current file, if any.
    pub fn seal_current(&self) {
        let now = self.date_provider.now();
        let mut state = self.lock();
        self.seal(&mut state, now, false);
    }

    /// The file currently accepting writes.
    pub fn current_writable_file(&self) -> Option<BatchFile> {
        self.lock().writable.as_ref().map(|w| w.file.clone())
    }

    fn validate(&self, write_size: u64) -> Result<()> {
        if write_size == 0 {
            return Err(StorageError::EmptyObject);
        }
        if write_size > self.preset.max_object_size {
            return Err(StorageError::ObjectTooLarge {
                size: write_size,
                max: self.preset.max_object_size,
            });
        }
        Ok(())
    }

    fn can_reuse(
        &self,
        current: &WritableFile,
        write_size: u64,
        group_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        if current.group_key.as_deref() != group_key {
            return false;
        }
        if !current.file.exists() {
            // deleted behind our back
            return false;
        }
        if elapsed(current.file.created_at(), now) > self.preset.max_file_age_for_write {
            return false;
        }
        if current.objects + 1 > self.preset.max_objects_in_file {
            return false;
        }
        match current.file.size() {
            Ok(size) => size + write_size <= self.preset.max_file_size,
            Err(e) => {
                self.telemetry
                    .error("Failed to reuse last writable file", Some(&e));
                false
            }
        }
    }

    fn create_writable(
        &self,
        state: &mut State,
        write_size: u64,
        group_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BatchFile> {
        let file = self.directory.create_file(millis_since_epoch(now))?;
        debug!(
            target: "tb_storage",
            file = file.name(),
            directory = %self.directory.path().display(),
            "opened new batch file"
        );
        state.writable = Some(WritableFile {
            file: file.clone(),
            objects: 1,
            approximate_size: write_size,
            last_write: now,
            group_key: group_key.map(str::to_string),
        });
        Ok(file)
    }

    fn seal(&self, state: &mut State, now: DateTime<Utc>, forced_new: bool) {
        if let Some(closed) = state.writable.take() {
            state
                .sealed_at
                .insert(closed.file.clone(), closed.last_write);
            self.send_batch_closed_metric(&closed, now, forced_new);
        }
    }

    // ---- readable files ----

    /// Oldest file ready to be read, checked out under a read marker.
    ///
    /// Obsolete files met on the way are deleted. A file is ready when:
    /// - it is older than `min_file_age_for_read` if it is the current
    ///   writable file or was not written by this process; the current file
    ///   must also have seen no write for the settle delay, and is sealed
    ///   when handed out
    /// - the settle delay has passed since its last write if it was sealed by
    ///   this process
    ///
    /// Returns `None` when the oldest unmarked file is not ready yet.
    pub fn get_readable_file(&self) -> Option<BatchFile> {
        let now = self.date_provider.now();
        let mut state = self.lock();
        let files = match self.directory.files() {
            Ok(files) => files,
            Err(e) => {
                self.telemetry
                    .error("Failed to obtain readable file", Some(&e));
                return None;
            }
        };
        let ignore_age = self.ignore_files_age_when_reading.load(Ordering::Relaxed);
        let settle_delay = self.preset.settle_delay();

        for file in files {
            if state.reading.contains(&file) {
                continue;
            }
            let age = elapsed(file.created_at(), now);
            if age > self.preset.max_file_age_for_read {
                self.delete_file(&mut state, &file, BatchRemovalReason::Obsolete, now);
                continue;
            }

            let is_current = state.is_writable(&file);
            let ready = ignore_age
                || match (&state.writable, state.sealed_at.get(&file)) {
                    (Some(current), _) if is_current => {
                        age >= self.preset.min_file_age_for_read
                            && elapsed(current.last_write, now) >= settle_delay
                    }
                    (_, Some(last_write)) => elapsed(*last_write, now) >= settle_delay,
                    _ => age >= self.preset.min_file_age_for_read,
                };
            if !ready {
                return None;
            }

            if is_current {
                self.seal(&mut state, now, false);
            }
            state.reading.insert(file.clone());
            return Some(file);
        }
        None
    }

    /// Delete a file that was read and drop its read marker.
    ///
    /// A file that is already gone counts as consumed.
    pub fn mark_consumed(&self, file: &BatchFile, reason: BatchRemovalReason) -> Result<()> {
        let now = self.date_provider.now();
        let mut state = self.lock();
        state.forget(file);
        file.delete()?;
        self.send_batch_deleted_metric(file, &reason, now);
        Ok(())
    }

    /// Drop the read marker of `file` without deleting it.
    ///
    /// Returns whether the file was marked.
    pub fn release_read_marker(&self, file: &BatchFile) -> bool {
        self.lock().reading.remove(file)
    }

    /// Drop everything remembered about `file` once it left the directory.
    pub(crate) fn forget(&self, file: &BatchFile) {
        self.lock().forget(file);
    }

    pub fn is_read_marked(&self, file: &BatchFile) -> bool {
        self.lock().reading.contains(file)
    }

    /// Skip every age check when reading. Meant for tests and flushes.
    pub fn set_ignore_files_age_when_reading(&self, ignore: bool) {
        self.ignore_files_age_when_reading
            .store(ignore, Ordering::Relaxed);
    }

    pub fn ignores_files_age_when_reading(&self) -> bool {
        self.ignore_files_age_when_reading.load(Ordering::Relaxed)
    }

    // ---- bulk operations & introspection ----

    /// Delete every batch file, marked or not. Returns how many went away.
    pub fn delete_all(&self, reason: BatchRemovalReason) -> usize {
        let now = self.date_provider.now();
        let mut state = self.lock();
        let files = match self.directory.files() {
            Ok(files) => files,
            Err(e) => {
                self.telemetry
                    .error("Failed to list files for deletion", Some(&e));
                return 0;
            }
        };
        let mut deleted = 0;
        for file in &files {
            if self.delete_file(&mut state, file, reason.clone(), now) {
                deleted += 1;
            }
        }
        state.writable = None;
        state.reading.clear();
        state.sealed_at.clear();
        deleted
    }

    /// Batch files in creation order.
    pub fn files(&self) -> Result<Vec<BatchFile>> {
        self.directory.files()
    }

    pub fn directory_size(&self) -> Result<u64> {
        self.directory.size()
    }

    // ---- eviction ----

    /// Delete obsolete files, then the oldest files while over budget.
    ///
    /// Read-marked files are never touched; the current writable file is
    /// only removed once obsolete.
    fn evict(&self, state: &mut State, now: DateTime<Utc>) {
        let files = match self.directory.files() {
            Ok(files) => files,
            Err(e) => {
                self.telemetry
                    .error("Failed to list files for eviction", Some(&e));
                return;
            }
        };

        let mut remaining: Vec<(BatchFile, u64, bool)> = Vec::with_capacity(files.len());
        for file in files {
            if !state.reading.contains(&file)
                && elapsed(file.created_at(), now) > self.preset.max_file_age_for_read
            {
                self.delete_file(state, &file, BatchRemovalReason::Obsolete, now);
                continue;
            }
            // a file removed since listing weighs nothing
            let size = file.size().unwrap_or(0);
            let protected = state.is_protected(&file);
            remaining.push((file, size, protected));
        }

        let mut total: u64 = remaining.iter().map(|(_, size, _)| size).sum();
        if total <= self.preset.max_directory_size {
            return;
        }
        warn!(
            target: "tb_storage",
            directory = %self.directory.path().display(),
            total,
            budget = self.preset.max_directory_size,
            "storage directory over budget, purging oldest batches"
        );
        for (file, size, protected) in remaining {
            if total <= self.preset.max_directory_size {
                break;
            }
            if protected {
                continue;
            }
            if self.delete_file(state, &file, BatchRemovalReason::Purged, now) {
                total = total.saturating_sub(size);
            }
        }
    }

    fn delete_file(
        &self,
        state: &mut State,
        file: &BatchFile,
        reason: BatchRemovalReason,
        now: DateTime<Utc>,
    ) -> bool {
        match file.delete() {
            Ok(()) => {
                state.forget(file);
                debug!(target: "tb_storage", file = file.name(), %reason, "deleted batch file");
                self.send_batch_deleted_metric(file, &reason, now);
                true
            }
            Err(e) => {
                self.telemetry.error(
                    &format!("Failed to delete batch file {}", file.name()),
                    Some(&e),
                );
                false
            }
        }
    }

    // ---- metrics ----

    fn send_batch_deleted_metric(
        &self,
        file: &BatchFile,
        reason: &BatchRemovalReason,
        now: DateTime<Utc>,
    ) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        if !reason.include_in_metric() {
            return;
        }
        self.telemetry.metric(
            BATCH_DELETED_METRIC,
            json!({
                "metric_type": "batch deleted",
                "track": metrics.track,
                "consent": metrics.consent.as_str(),
                "uploader_delay": {
                    "min": as_millis(self.preset.min_upload_delay),
                    "max": as_millis(self.preset.max_upload_delay),
                },
                "uploader_window": as_millis(self.preset.uploader_window()),
                "batch_age": as_millis(elapsed(file.created_at(), now)),
                "batch_removal_reason": reason.label(),
            }),
        );
    }

    fn send_batch_closed_metric(&self, closed: &WritableFile, now: DateTime<Utc>, forced_new: bool) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        self.telemetry.metric(
            BATCH_CLOSED_METRIC,
            json!({
                "metric_type": "batch closed",
                "track": metrics.track,
                "consent": metrics.consent.as_str(),
                "uploader_window": as_millis(self.preset.uploader_window()),
                "batch_size": closed.approximate_size,
                "batch_events_count": closed.objects,
                "batch_duration": as_millis(elapsed(closed.file.created_at(), now)),
                "forced_new": forced_new,
            }),
        );
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Time from `since` to `now`, zero if the clock went backwards.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tb_common::test_utils::{RelativeDateProvider, TelemetryMock};
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        clock: Arc<RelativeDateProvider>,
        telemetry: Arc<TelemetryMock>,
        orchestrator: FilesOrchestrator,
    }

    fn preset() -> PerformancePreset {
        PerformancePreset {
            max_file_size: 100,
            max_directory_size: 250,
            max_file_age_for_write: Duration::from_secs(1),
            min_file_age_for_read: Duration::from_secs(2),
            max_file_age_for_read: Duration::from_secs(60),
            max_objects_in_file: 3,
            max_object_size: 50,
            ..PerformancePreset::default()
        }
    }

    fn fixture_with(preset: PerformancePreset) -> Fixture {
        let dir = tempdir().unwrap();
        let directory = Directory::create(dir.path().join("batches")).unwrap();
        let clock = Arc::new(RelativeDateProvider::default());
        let telemetry = Arc::new(TelemetryMock::new());
        let orchestrator =
            FilesOrchestrator::new(directory, preset, clock.clone(), telemetry.clone())
                .with_metrics(MetricsContext {
                    track: "logs".into(),
                    consent: TrackingConsent::Granted,
                });
        Fixture {
            _dir: dir,
            clock,
            telemetry,
            orchestrator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(preset())
    }

    fn write(f: &Fixture, size: u64) -> BatchFile {
        let file = f.orchestrator.get_writable_file(size).unwrap();
        file.append(&vec![1u8; size as usize]).unwrap();
        file
    }

    #[test]
    fn test_reuses_file_within_limits() {
        let f = fixture();
        let a = write(&f, 10);
        let b = write(&f, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rotates_on_size() {
        let f = fixture();
        let a = write(&f, 50);
        let b = write(&f, 50);
        assert_eq!(a, b);
        let c = write(&f, 1);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rotates_on_object_count() {
        let f = fixture();
        let a = write(&f, 1);
        write(&f, 1);
        write(&f, 1);
        let d = write(&f, 1);
        assert_ne!(a, d);
        assert_eq!(f.telemetry.metrics(BATCH_CLOSED_METRIC).len(), 1);
        let closed = &f.telemetry.metrics(BATCH_CLOSED_METRIC)[0];
        assert_eq!(closed["batch_events_count"], 3);
        assert_eq!(closed["forced_new"], false);
    }

    #[test]
    fn test_rotates_on_age() {
        let f = fixture();
        let a = write(&f, 1);
        f.clock.advance(Duration::from_millis(1001));
        let b = write(&f, 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_rotates_when_file_deleted_externally() {
        let f = fixture();
        let a = write(&f, 1);
        fs::remove_file(a.path()).unwrap();
        let b = f.orchestrator.get_writable_file(1).unwrap();
        assert!(b.exists());
    }

    #[test]
    fn test_rotates_on_group_key_change() {
        let f = fixture();
        let a = f.orchestrator.get_writable_file_for_group(1, Some("view-1")).unwrap();
        let b = f.orchestrator.get_writable_file_for_group(1, Some("view-1")).unwrap();
        let c = f.orchestrator.get_writable_file_for_group(1, Some("view-2")).unwrap();
        assert_eq!(a, b);
        assert_ne!(b, c);
        let closed = f.telemetry.metrics(BATCH_CLOSED_METRIC);
        assert_eq!(closed[0]["forced_new"], true);
    }

    #[test]
    fn test_same_millisecond_files_get_distinct_names() {
        let f = fixture();
        let a = f.orchestrator.get_new_writable_file(1).unwrap();
        let b = f.orchestrator.get_new_writable_file(1).unwrap();
        assert_ne!(a, b);
        assert_eq!(b.created_ms(), a.created_ms() + 1);
    }

    #[test]
    fn test_rejects_invalid_sizes() {
        let f = fixture();
        assert!(matches!(
            f.orchestrator.get_writable_file(0),
            Err(StorageError::EmptyObject)
        ));
        assert!(matches!(
            f.orchestrator.get_writable_file(51),
            Err(StorageError::ObjectTooLarge { size: 51, max: 50 })
        ));
        assert!(f.orchestrator.files().unwrap().is_empty());
    }

    #[test]
    fn test_current_file_not_readable_until_old_enough() {
        let f = fixture();
        write(&f, 1);
        assert!(f.orchestrator.get_readable_file().is_none());
        f.clock.advance(Duration::from_millis(1999));
        assert!(f.orchestrator.get_readable_file().is_none());
        f.clock.advance(Duration::from_millis(1));
        let file = f.orchestrator.get_readable_file().unwrap();
        // handing it out seals it
        assert!(f.orchestrator.current_writable_file().is_none());
        assert!(f.orchestrator.is_read_marked(&file));
    }

    #[test]
    fn test_sealed_file_readable_after_settle_delay() {
        let f = fixture();
        let a = write(&f, 60);
        let b = write(&f, 60);
        assert_ne!(a, b);
        assert!(f.orchestrator.get_readable_file().is_none());
        // settle delay is 1s for this preset
        f.clock.advance(Duration::from_millis(1000));
        assert_eq!(f.orchestrator.get_readable_file(), Some(a));
    }

    #[test]
    fn test_read_marker_excludes_file() {
        let f = fixture();
        f.orchestrator.set_ignore_files_age_when_reading(true);
        let a = f.orchestrator.get_new_writable_file(1).unwrap();
        let b = f.orchestrator.get_new_writable_file(1).unwrap();

        assert_eq!(f.orchestrator.get_readable_file(), Some(a.clone()));
        assert_eq!(f.orchestrator.get_readable_file(), Some(b.clone()));
        assert_eq!(f.orchestrator.get_readable_file(), None);

        assert!(f.orchestrator.release_read_marker(&a));
        assert!(!f.orchestrator.release_read_marker(&a));
        assert_eq!(f.orchestrator.get_readable_file(), Some(a));
    }

    #[test]
    fn test_mark_consumed_deletes_and_reports() {
        let f = fixture();
        f.orchestrator.set_ignore_files_age_when_reading(true);
        write(&f, 1);
        let file = f.orchestrator.get_readable_file().unwrap();
        f.orchestrator
            .mark_consumed(&file, BatchRemovalReason::IntakeCode { response_code: 202 })
            .unwrap();
        assert!(!file.exists());
        assert!(!f.orchestrator.is_read_marked(&file));
        let deleted = f.telemetry.metrics(BATCH_DELETED_METRIC);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0]["batch_removal_reason"], "intake-code-202");
        assert_eq!(deleted[0]["track"], "logs");

        // already gone is fine
        f.orchestrator
            .mark_consumed(&file, BatchRemovalReason::Flushed)
            .unwrap();
        assert_eq!(f.telemetry.metrics(BATCH_DELETED_METRIC).len(), 1);
    }

    #[test]
    fn test_obsolete_files_deleted_on_read() {
        let f = fixture();
        let old = write(&f, 1);
        f.orchestrator.seal_current();
        f.clock.advance(Duration::from_secs(61));
        assert!(f.orchestrator.get_readable_file().is_none());
        assert!(!old.exists());
        let deleted = f.telemetry.metrics(BATCH_DELETED_METRIC);
        assert_eq!(deleted[0]["batch_removal_reason"], "obsolete");
    }

    #[test]
    fn test_obsolete_files_deleted_on_write() {
        let f = fixture();
        let old = write(&f, 1);
        f.clock.advance(Duration::from_secs(61));
        let new = write(&f, 1);
        assert!(!old.exists());
        assert!(new.exists());
    }

    #[test]
    fn test_purges_oldest_files_over_budget() {
        let f = fixture();
        let mut created = Vec::new();
        for _ in 0..3 {
            let file = f.orchestrator.get_new_writable_file(1).unwrap();
            file.append(&[0u8; 90]).unwrap();
            created.push(file);
        }
        // 270 bytes on disk, budget 250
        write(&f, 1);
        assert!(!created[0].exists());
        assert!(created[1].exists());
        assert!(created[2].exists());
        assert!(f.orchestrator.directory_size().unwrap() <= 250 + 1);
        let reasons: Vec<_> = f
            .telemetry
            .metrics(BATCH_DELETED_METRIC)
            .iter()
            .map(|m| m["batch_removal_reason"].clone())
            .collect();
        assert_eq!(reasons, vec!["purged"]);
    }

    #[test]
    fn test_purge_skips_read_marked_files() {
        let f = fixture();
        f.orchestrator.set_ignore_files_age_when_reading(true);
        let mut created = Vec::new();
        for _ in 0..3 {
            let file = f.orchestrator.get_new_writable_file(1).unwrap();
            file.append(&[0u8; 100]).unwrap();
            created.push(file);
        }
        let reading = f.orchestrator.get_readable_file().unwrap();
        assert_eq!(reading, created[0]);

        write(&f, 1);
        assert!(created[0].exists());
        assert!(!created[1].exists());
    }

    #[test]
    fn test_delete_all_clears_state() {
        let f = fixture();
        f.orchestrator.set_ignore_files_age_when_reading(true);
        f.orchestrator.get_new_writable_file(1).unwrap();
        f.orchestrator.get_new_writable_file(1).unwrap();
        let marked = f.orchestrator.get_readable_file().unwrap();

        assert_eq!(f.orchestrator.delete_all(BatchRemovalReason::Cleared), 2);
        assert!(f.orchestrator.files().unwrap().is_empty());
        assert!(f.orchestrator.current_writable_file().is_none());
        assert!(!f.orchestrator.is_read_marked(&marked));
        // cleared is not a delivery metric
        assert!(f.telemetry.metrics(BATCH_DELETED_METRIC).is_empty());
    }

    #[test]
    fn test_no_metrics_without_context() {
        let dir = tempdir().unwrap();
        let telemetry = Arc::new(TelemetryMock::new());
        let orchestrator = FilesOrchestrator::new(
            Directory::create(dir.path()).unwrap(),
            preset(),
            Arc::new(RelativeDateProvider::default()),
            telemetry.clone(),
        );
        orchestrator.get_new_writable_file(1).unwrap();
        orchestrator.get_new_writable_file(1).unwrap();
        assert!(telemetry.messages().is_empty());
    }

    #[test]
    fn test_append_never_lands_in_a_handed_out_file() {
        let f = fixture_with(PerformancePreset {
            max_directory_size: u64::MAX,
            ..preset()
        });
        f.orchestrator.set_ignore_files_age_when_reading(true);
        let appends = 300;

        let mut consumed = 0;
        std::thread::scope(|scope| {
            let producer = scope.spawn(|| {
                for _ in 0..appends {
                    f.orchestrator.append(&[7u8; 10], None).unwrap();
                }
            });
            while !producer.is_finished() {
                if let Some(file) = f.orchestrator.get_readable_file() {
                    consumed += file.read().unwrap().len();
                    f.orchestrator
                        .mark_consumed(&file, BatchRemovalReason::Flushed)
                        .unwrap();
                }
            }
        });
        while let Some(file) = f.orchestrator.get_readable_file() {
            consumed += file.read().unwrap().len();
            f.orchestrator
                .mark_consumed(&file, BatchRemovalReason::Flushed)
                .unwrap();
        }

        assert_eq!(consumed, appends * 10);
        assert!(f.orchestrator.files().unwrap().is_empty());
        assert!(f.telemetry.errors().is_empty());
    }
}

//! Upload loop: Reader → BatchFormatter → Transport.
//!
//! ```text
//!            ┌──────── delay.current() ◄────────┐
//!            ▼                                  │
//! sleep ─► run_cycle ─► read ─► format ─► upload ─► mark read | release
//! ```
//!
//! A cycle sends at most `max_batches_per_upload` batches and stops at the
//! first batch the intake asks to retry or answers with an error.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tb_common::{BatchRemovalReason, PerformancePreset, Telemetry};
use tb_storage::{Batch, Reader};
use tracing::{debug, error, info};

use crate::delay::DataUploadDelay;
use crate::error::{Result, UploadError, UploadFailure};
use crate::format::BatchFormatter;
use crate::transport::{Transport, UploadStatus};

/// What one upload cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Accepted, or rejected for good, and deleted.
    pub delivered: usize,
    /// Released for a later cycle.
    pub retried: usize,
    /// Deleted without a successful upload.
    pub dropped: usize,
    /// Pause before the next cycle.
    pub next_delay: Duration,
}

impl CycleReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.retried + self.dropped
    }
}

/// Drives uploads for one feature.
///
/// Cycles run either on the background thread started by
/// [`UploadWorker::spawn`] or on the caller via [`UploadWorker::run_cycle`];
/// never two at once.
pub struct UploadWorker {
    inner: Arc<Inner>,
    background: Mutex<Option<Background>>,
}

struct Background {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

struct Inner {
    feature: String,
    reader: Reader,
    formatter: BatchFormatter,
    transport: Arc<dyn Transport>,
    delay: Mutex<DataUploadDelay>,
    max_batches_per_upload: usize,
    telemetry: Arc<dyn Telemetry>,
    cycle_lock: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl UploadWorker {
    pub fn new(
        feature: impl Into<String>,
        reader: Reader,
        formatter: BatchFormatter,
        transport: Arc<dyn Transport>,
        preset: &PerformancePreset,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        UploadWorker {
            inner: Arc::new(Inner {
                feature: feature.into(),
                reader,
                formatter,
                transport,
                delay: Mutex::new(DataUploadDelay::new(preset)),
                max_batches_per_upload: preset.max_batches_per_upload.max(1),
                telemetry,
                cycle_lock: Mutex::new(()),
            }),
            background: Mutex::new(None),
        }
    }

    pub fn feature(&self) -> &str {
        &self.inner.feature
    }

    /// Pause before the next background cycle.
    pub fn current_delay(&self) -> Duration {
        lock(&self.inner.delay).current()
    }

    /// Run one upload cycle on the calling thread.
    pub fn run_cycle(&self) -> CycleReport {
        self.inner.run_cycle()
    }

    /// Start cycling on a background thread. No-op if already running.
    pub fn spawn(&self) -> Result<()> {
        let mut background = lock(&self.background);
        if background.is_some() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name(format!("tb-upload-{}", self.inner.feature))
            .spawn(move || {
                loop {
                    let delay = lock(&inner.delay).current();
                    match stopped.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {
                            inner.run_cycle();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(target: "tb_upload", feature = %inner.feature, "upload loop stopped");
            })
            .map_err(UploadError::Spawn)?;

        info!(target: "tb_upload", feature = %self.inner.feature, "upload loop started");
        *background = Some(Background { stop, thread });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.background).is_some()
    }

    /// Stop the background loop. An upload already in flight completes
    /// first; the caller blocks until then.
    pub fn cancel(&self) {
        let Some(background) = lock(&self.background).take() else {
            return;
        };
        let _ = background.stop.send(());
        if background.thread.thread().id() != thread::current().id() {
            let _ = background.thread.join();
        }
    }

    /// Send every stored batch once, without retrying, and delete each one
    /// whatever the outcome. Returns the number of batches processed.
    pub fn flush_synchronously(&self) -> usize {
        self.inner.flush()
    }
}

impl Drop for UploadWorker {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for UploadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadWorker")
            .field("feature", &self.inner.feature)
            .field("formatter", &self.inner.formatter)
            .field("max_batches_per_upload", &self.inner.max_batches_per_upload)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn run_cycle(&self) -> CycleReport {
        let _cycle = lock(&self.cycle_lock);
        let mut report = CycleReport::default();
        let mut all_succeeded = false;

        while report.attempted() < self.max_batches_per_upload {
            let Some(batch) = self.reader.read_next_batch() else {
                break;
            };
            let status = match self.upload(&batch) {
                Ok(status) => status,
                Err(e) => {
                    // cannot be initiated, so retrying would fail the same way
                    self.telemetry.error(
                        &format!("Failed to initiate '{}' data upload", self.feature),
                        Some(&e),
                    );
                    self.reader
                        .mark_batch_as_read_with_reason(batch, BatchRemovalReason::Invalid);
                    report.dropped += 1;
                    continue;
                }
            };

            if status.needs_retry {
                debug!(target: "tb_upload", feature = %self.feature, code = ?status.response_code, "not delivered, will be retransmitted");
                self.reader.release_batch(batch);
                report.retried += 1;
            } else {
                debug!(target: "tb_upload", feature = %self.feature, code = ?status.response_code, "accepted, won't be retransmitted");
                let reason = match status.response_code {
                    Some(response_code) => BatchRemovalReason::IntakeCode { response_code },
                    None => BatchRemovalReason::Delivered,
                };
                self.reader.mark_batch_as_read_with_reason(batch, reason);
                report.delivered += 1;
                all_succeeded = true;
            }

            if let Some(failure) = &status.error {
                all_succeeded = false;
                self.report_failure(failure);
                break;
            }
            if status.needs_retry {
                break;
            }
        }

        let mut delay = lock(&self.delay);
        if all_succeeded {
            delay.decrease();
        } else {
            delay.increase();
        }
        report.next_delay = delay.current();

        if report.attempted() == 0 {
            debug!(target: "tb_upload", feature = %self.feature, "no batch to upload");
        } else {
            debug!(
                target: "tb_upload",
                feature = %self.feature,
                delivered = report.delivered,
                retried = report.retried,
                dropped = report.dropped,
                next_delay_ms = report.next_delay.as_millis() as u64,
                "upload cycle finished"
            );
        }
        report
    }

    fn flush(&self) -> usize {
        let _cycle = lock(&self.cycle_lock);
        let ignored_before = self.reader.ignores_files_age_when_reading();
        self.reader.set_ignore_files_age_when_reading(true);
        let mut flushed = 0;
        while let Some(batch) = self.reader.read_next_batch() {
            if let Err(e) = self.upload(&batch) {
                self.telemetry.error(
                    &format!("Failed to flush '{}' data", self.feature),
                    Some(&e),
                );
            }
            self.reader
                .mark_batch_as_read_with_reason(batch, BatchRemovalReason::Flushed);
            flushed += 1;
        }
        self.reader.set_ignore_files_age_when_reading(ignored_before);
        flushed
    }

    fn upload(&self, batch: &Batch) -> Result<UploadStatus> {
        let request = self.formatter.build_request(batch.records())?;
        debug!(
            target: "tb_upload",
            feature = %self.feature,
            batch = batch.handle().name(),
            records = request.record_count,
            bytes = request.body.len(),
            "uploading batch"
        );
        self.transport.upload(&request)
    }

    fn report_failure(&self, failure: &UploadFailure) {
        match failure {
            UploadFailure::Unauthorized => {
                error!(
                    target: "tb_upload",
                    feature = %self.feature,
                    "upload rejected: make sure the client token is valid for the targeted intake"
                );
            }
            UploadFailure::HttpError { status_code } => {
                self.telemetry.error(
                    &format!("Data upload finished with status code: {}", status_code),
                    None,
                );
            }
            UploadFailure::NetworkError(_) => {
                self.telemetry
                    .error("Data upload finished with error", Some(failure));
            }
        }
    }
}

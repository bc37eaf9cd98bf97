//! Batch reader over the authorized directory.
//!
//! A batch is checked out under a read marker and stays on disk until the
//! caller confirms delivery; releasing it makes it readable again, which is
//! what gives at-least-once delivery.

use std::io::ErrorKind;
use std::sync::{Arc, Mutex};

use tb_common::{BatchRemovalReason, Telemetry};
use tracing::debug;

use crate::encryption::DataEncryption;
use crate::error::StorageError;
use crate::file::BatchFile;
use crate::orchestrator::FilesOrchestrator;
use crate::tlv::{decode_blocks, DecodeIssue};

/// Opaque reference from a batch back to its file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchHandle {
    file: BatchFile,
}

impl BatchHandle {
    /// Name of the underlying batch file.
    pub fn name(&self) -> &str {
        self.file.name()
    }
}

/// Records read from one batch file, in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Vec<u8>>,
    handle: BatchHandle,
}

impl Batch {
    pub fn records(&self) -> &[Vec<u8>] {
        &self.records
    }

    pub fn handle(&self) -> &BatchHandle {
        &self.handle
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Vec<u8>>, BatchHandle) {
        (self.records, self.handle)
    }
}

/// Reads batches for upload. Clones share one read lock, so at most one
/// read is in flight per reader family.
#[derive(Clone)]
pub struct Reader {
    orchestrator: Arc<FilesOrchestrator>,
    encryption: Option<Arc<dyn DataEncryption>>,
    telemetry: Arc<dyn Telemetry>,
    read_lock: Arc<Mutex<()>>,
}

impl Reader {
    pub fn new(orchestrator: Arc<FilesOrchestrator>, telemetry: Arc<dyn Telemetry>) -> Self {
        Reader {
            orchestrator,
            encryption: None,
            telemetry,
            read_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_encryption(mut self, encryption: Arc<dyn DataEncryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Check out the oldest readable batch.
    ///
    /// Files without a single valid record are deleted as invalid and the
    /// next file is tried.
    pub fn read_next_batch(&self) -> Option<Batch> {
        let _guard = self.read_lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let file = self.orchestrator.get_readable_file()?;
            match self.load(&file) {
                Ok(records) if !records.is_empty() => {
                    return Some(Batch {
                        records,
                        handle: BatchHandle { file },
                    });
                }
                Ok(_) => {
                    if let Err(e) = self
                        .orchestrator
                        .mark_consumed(&file, BatchRemovalReason::Invalid)
                    {
                        self.telemetry
                            .error("Failed to delete invalid batch file", Some(&e));
                        self.orchestrator.release_read_marker(&file);
                        return None;
                    }
                }
                Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                    // evicted or migrated between listing and reading
                    self.orchestrator.release_read_marker(&file);
                }
                Err(e) => {
                    self.telemetry.error("Failed to read batch file", Some(&e));
                    self.orchestrator.release_read_marker(&file);
                    return None;
                }
            }
        }
    }

    /// Check out up to `limit` batches, oldest first.
    pub fn read_next_batches(&self, limit: usize) -> Vec<Batch> {
        let mut batches = Vec::new();
        while batches.len() < limit {
            match self.read_next_batch() {
                Some(batch) => batches.push(batch),
                None => break,
            }
        }
        batches
    }

    /// Delete a delivered batch.
    pub fn mark_batch_as_read(&self, batch: Batch) {
        self.mark_handle_as_read(batch.handle, BatchRemovalReason::Delivered);
    }

    pub fn mark_batch_as_read_with_reason(&self, batch: Batch, reason: BatchRemovalReason) {
        self.mark_handle_as_read(batch.handle, reason);
    }

    /// Delete the batch behind `handle`.
    pub fn mark_handle_as_read(&self, handle: BatchHandle, reason: BatchRemovalReason) {
        if let Err(e) = self.orchestrator.mark_consumed(&handle.file, reason) {
            self.telemetry.error(
                &format!("Failed to delete batch file {}", handle.name()),
                Some(&e),
            );
        }
    }

    /// Return a batch unsent; it becomes readable again.
    pub fn release_batch(&self, batch: Batch) {
        self.release_handle(batch.handle);
    }

    pub fn release_handle(&self, handle: BatchHandle) {
        self.orchestrator.release_read_marker(&handle.file);
    }

    /// Transport outcome: delete on success, release on failure.
    pub fn on_upload_result(&self, handle: BatchHandle, success: bool) {
        if success {
            self.mark_handle_as_read(handle, BatchRemovalReason::Delivered);
        } else {
            self.release_handle(handle);
        }
    }

    /// Skip the file age checks, e.g. to drain storage synchronously.
    pub fn set_ignore_files_age_when_reading(&self, ignore: bool) {
        self.orchestrator.set_ignore_files_age_when_reading(ignore);
    }

    pub fn ignores_files_age_when_reading(&self) -> bool {
        self.orchestrator.ignores_files_age_when_reading()
    }

    fn load(&self, file: &BatchFile) -> crate::error::Result<Vec<Vec<u8>>> {
        let data = file.read()?;
        let preset = self.orchestrator.preset();
        let decoded = decode_blocks(&data, preset.max_file_size.max(preset.max_object_size));

        match &decoded.issue {
            Some(issue @ DecodeIssue::Truncated { .. }) => {
                // expected after a crash mid-append
                debug!(target: "tb_storage", file = file.name(), %issue, "dropping incomplete trailing record");
                self.telemetry.debug(&format!(
                    "Incomplete record in batch file {}: {}",
                    file.name(),
                    issue
                ));
            }
            Some(issue @ DecodeIssue::Oversized { .. }) => {
                self.telemetry.error(
                    &format!("Corrupted batch file {}: {}", file.name(), issue),
                    None,
                );
            }
            None => {}
        }

        let mut records = Vec::with_capacity(decoded.records.len());
        for payload in decoded.records {
            match &self.encryption {
                Some(encryption) => match encryption.decrypt(&payload) {
                    Ok(plain) => records.push(plain),
                    Err(e) => self.telemetry.error("Failed to decrypt record", Some(&e)),
                },
                None => records.push(payload),
            }
        }
        Ok(records)
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("directory", &self.orchestrator.directory().path())
            .field("encrypted", &self.encryption.is_some())
            .finish_non_exhaustive()
    }
}

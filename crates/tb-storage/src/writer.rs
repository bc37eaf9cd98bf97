//! Consent-aware record writer.
//!
//! `write` never blocks on disk: the route is decided on the caller's thread
//! under the consent gate's read lock, then the append is queued on the
//! feature's work queue.
//!
//! ```text
//! write(record) ──► ConsentGate ──granted──► authorized orchestrator ─┐
//!                        │ ──pending──► unauthorized orchestrator ────┤──► queue ──► append
//!                        └ ──not granted──► dropped                   ┘
//! ```

use std::sync::Arc;

use tb_common::{Telemetry, TrackingConsent};
use tracing::trace;

use crate::consent::ConsentGate;
use crate::encryption::DataEncryption;
use crate::event::{Event, EventMapper};
use crate::orchestrator::FilesOrchestrator;
use crate::queue::WorkQueue;
use crate::tlv::encode_block;

/// Handle used by producers to persist records. Cheap to clone.
#[derive(Clone)]
pub struct Writer {
    gate: Arc<ConsentGate>,
    queue: Arc<WorkQueue>,
    authorized: Arc<FilesOrchestrator>,
    unauthorized: Arc<FilesOrchestrator>,
    encryption: Option<Arc<dyn DataEncryption>>,
    mapper: EventMapper,
    telemetry: Arc<dyn Telemetry>,
}

impl Writer {
    pub fn new(
        gate: Arc<ConsentGate>,
        queue: Arc<WorkQueue>,
        authorized: Arc<FilesOrchestrator>,
        unauthorized: Arc<FilesOrchestrator>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Writer {
            gate,
            queue,
            authorized,
            unauthorized,
            encryption: None,
            mapper: EventMapper::default(),
            telemetry,
        }
    }

    pub fn with_encryption(mut self, encryption: Arc<dyn DataEncryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn with_event_mapper(mut self, mapper: EventMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Persist an encoded record according to the current consent.
    pub fn write(&self, record: Vec<u8>) {
        self.dispatch(record, None, false);
    }

    /// Map and persist a categorized event.
    ///
    /// Session replay records rotate to a new file whenever their view
    /// changes.
    pub fn write_event(&self, event: Event) {
        if let Some(mapped) = self.mapper.map(event, self.telemetry.as_ref()) {
            self.dispatch(mapped.payload, mapped.group_key, false);
        }
    }

    /// Persist straight to the authorized directory, whatever the consent.
    ///
    /// For SDK-internal data that is not subject to user consent.
    pub fn write_bypassing_consent(&self, record: Vec<u8>) {
        self.dispatch(record, None, true);
    }

    fn dispatch(&self, record: Vec<u8>, group_key: Option<String>, bypass_consent: bool) {
        let submitted = self.gate.with_current(|consent| {
            let orchestrator = if bypass_consent {
                &self.authorized
            } else {
                match consent {
                    TrackingConsent::Granted => &self.authorized,
                    TrackingConsent::Pending => &self.unauthorized,
                    TrackingConsent::NotGranted => {
                        trace!(target: "tb_storage", "consent not granted, record dropped");
                        return Ok(());
                    }
                }
            };
            let job = WriteJob {
                orchestrator: Arc::clone(orchestrator),
                encryption: self.encryption.clone(),
                telemetry: Arc::clone(&self.telemetry),
                record,
                group_key,
            };
            self.queue.submit(move || job.run())
        });

        if let Err(e) = submitted {
            self.telemetry.error("Failed to schedule write", Some(&e));
        }
    }
}

impl std::fmt::Debug for Writer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("queue", &self.queue.label())
            .field("encrypted", &self.encryption.is_some())
            .finish_non_exhaustive()
    }
}

/// One append, executed on the work queue.
struct WriteJob {
    orchestrator: Arc<FilesOrchestrator>,
    encryption: Option<Arc<dyn DataEncryption>>,
    telemetry: Arc<dyn Telemetry>,
    record: Vec<u8>,
    group_key: Option<String>,
}

impl WriteJob {
    fn run(self) {
        let payload = match &self.encryption {
            Some(encryption) => match encryption.encrypt(&self.record) {
                Ok(cipher) => cipher,
                Err(e) => {
                    self.telemetry.error("Failed to encrypt data", Some(&e));
                    return;
                }
            },
            None => self.record,
        };

        let block = match encode_block(&payload) {
            Ok(block) => block,
            Err(e) => {
                self.telemetry.error("Failed to encode record", Some(&e));
                return;
            }
        };

        if let Err(e) = self.orchestrator.append(&block, self.group_key.as_deref()) {
            self.telemetry.error(
                &format!("Failed to write {} bytes to batch file", block.len()),
                Some(&e),
            );
        }
    }
}

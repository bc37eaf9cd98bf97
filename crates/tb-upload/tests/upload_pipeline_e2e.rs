//! End-to-end tests from `Writer::write` to the transport.
//!
//! Validates:
//! - Records reach the transport as one JSON array per batch, oldest first
//! - Compressed bodies decode back to the written records
//! - Pending data is only uploaded after consent is granted
//! - A failing intake keeps data on disk until it recovers
//! - Writes racing a synchronous flush all reach the intake

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use flate2::read::ZlibDecoder;
use tb_common::test_utils::{RelativeDateProvider, TelemetryMock};
use tb_common::{PerformancePreset, TrackingConsent};
use tb_storage::{ConsentGate, FeatureStorage};
use tb_upload::{
    BatchFormatter, Compression, DataFormat, Transport, UploadRequest, UploadStatus, UploadWorker,
};
use tempfile::{tempdir, TempDir};

// ============================================================================
// Helpers
// ============================================================================

/// Decodes every body it receives and answers with a settable status code.
struct RecordingIntake {
    status: Mutex<u16>,
    received: Mutex<Vec<serde_json::Value>>,
}

impl RecordingIntake {
    fn new() -> Arc<Self> {
        Arc::new(RecordingIntake {
            status: Mutex::new(202),
            received: Mutex::new(Vec::new()),
        })
    }

    fn answer_with(&self, code: u16) {
        *self.status.lock().unwrap() = code;
    }

    fn received(&self) -> Vec<serde_json::Value> {
        self.received.lock().unwrap().clone()
    }
}

impl Transport for RecordingIntake {
    fn upload(&self, request: &UploadRequest) -> tb_upload::Result<UploadStatus> {
        let body = match request.content_encoding {
            Some("deflate") => {
                let mut out = Vec::new();
                ZlibDecoder::new(request.body.as_slice()).read_to_end(&mut out)?;
                out
            }
            _ => request.body.clone(),
        };
        let code = *self.status.lock().unwrap();
        if code == 202 {
            let batch: Vec<serde_json::Value> = serde_json::from_slice(&body)
                .map_err(|e| tb_upload::UploadError::InvalidRequest(e.to_string()))?;
            self.received.lock().unwrap().extend(batch);
        }
        Ok(UploadStatus::from_response_code(code))
    }
}

struct Pipeline {
    _dir: TempDir,
    gate: Arc<ConsentGate>,
    storage: FeatureStorage,
    intake: Arc<RecordingIntake>,
    telemetry: Arc<TelemetryMock>,
    worker: UploadWorker,
}

fn pipeline(consent: TrackingConsent) -> Pipeline {
    let dir = tempdir().expect("tempdir");
    let preset = PerformancePreset {
        max_objects_in_file: 3,
        max_batches_per_upload: 100,
        ..PerformancePreset::default()
    };
    let telemetry = Arc::new(TelemetryMock::new());
    let gate = Arc::new(ConsentGate::new(consent));
    let storage = FeatureStorage::new(
        "rum",
        dir.path(),
        preset.clone(),
        gate.clone(),
        Arc::new(RelativeDateProvider::default()),
        telemetry.clone(),
    )
    .expect("open storage");
    storage.set_ignore_files_age_when_reading(true);

    let intake = RecordingIntake::new();
    let worker = UploadWorker::new(
        "rum",
        storage.reader(),
        BatchFormatter::new(DataFormat::json_array(), Compression::Deflate),
        intake.clone(),
        &preset,
        telemetry.clone(),
    );
    Pipeline {
        _dir: dir,
        gate,
        storage,
        intake,
        telemetry,
        worker,
    }
}

fn write_events(p: &Pipeline, range: std::ops::Range<u64>) {
    let writer = p.storage.writer();
    for i in range {
        writer.write(serde_json::to_vec(&serde_json::json!({ "seq": i })).unwrap());
    }
    p.storage.flush().unwrap();
}

fn sequence(values: &[serde_json::Value]) -> Vec<u64> {
    values.iter().map(|v| v["seq"].as_u64().unwrap()).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn records_arrive_in_write_order() {
    let p = pipeline(TrackingConsent::Granted);
    write_events(&p, 0..10);

    let report = p.worker.run_cycle();
    assert_eq!(report.delivered, 4);
    assert_eq!(sequence(&p.intake.received()), (0..10).collect::<Vec<_>>());
    assert!(p.storage.authorized_files().unwrap().is_empty());
}

#[test]
fn pending_data_uploads_only_after_grant() {
    let p = pipeline(TrackingConsent::Pending);
    write_events(&p, 0..5);
    assert_eq!(p.worker.run_cycle().attempted(), 0);
    assert!(p.intake.received().is_empty());

    p.gate.change_consent(TrackingConsent::Granted);
    write_events(&p, 5..7);
    p.worker.run_cycle();
    assert_eq!(sequence(&p.intake.received()), (0..7).collect::<Vec<_>>());
}

#[test]
fn refused_consent_uploads_nothing() {
    let p = pipeline(TrackingConsent::Pending);
    write_events(&p, 0..5);
    p.gate.change_consent(TrackingConsent::NotGranted);
    write_events(&p, 5..10);

    assert_eq!(p.worker.run_cycle().attempted(), 0);
    assert_eq!(p.storage.disk_usage().unwrap(), 0);
}

#[test]
fn outage_keeps_data_until_intake_recovers() {
    let p = pipeline(TrackingConsent::Granted);
    write_events(&p, 0..6);

    p.intake.answer_with(503);
    for _ in 0..3 {
        let report = p.worker.run_cycle();
        assert_eq!(report.retried, 1);
        assert!(report.next_delay > Duration::ZERO);
    }
    assert_eq!(p.storage.authorized_files().unwrap().len(), 2);

    p.intake.answer_with(202);
    p.worker.run_cycle();
    assert_eq!(sequence(&p.intake.received()), (0..6).collect::<Vec<_>>());
}

#[test]
fn writes_racing_a_flush_are_not_lost() {
    let p = pipeline(TrackingConsent::Granted);
    let total = 1200u64;
    let writer = p.storage.writer();
    let producer = thread::spawn(move || {
        for i in 0..total {
            writer.write(serde_json::to_vec(&serde_json::json!({ "seq": i })).unwrap());
        }
    });
    while !producer.is_finished() {
        p.worker.flush_synchronously();
    }
    producer.join().unwrap();
    p.storage.flush().unwrap();
    p.worker.flush_synchronously();

    let mut delivered = sequence(&p.intake.received());
    delivered.sort_unstable();
    assert_eq!(delivered, (0..total).collect::<Vec<_>>());
    assert!(p.telemetry.errors().is_empty());
    assert!(p.storage.authorized_files().unwrap().is_empty());
}

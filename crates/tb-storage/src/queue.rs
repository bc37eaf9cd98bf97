//! Sequential background work queue.
//!
//! ```text
//! submit() ──► mpsc::channel ──► worker thread ──► job(), job(), ...
//!    │
//!    └─ returns immediately
//! ```
//!
//! Jobs run one at a time in submission order. A panicking job is caught
//! and logged; the worker keeps going.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tracing::{debug, error};

use crate::error::{Result, StorageError};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Job),
    Shutdown,
}

/// Single-consumer FIFO executor backed by one named thread.
pub struct WorkQueue {
    label: String,
    sender: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl WorkQueue {
    /// Spawn the worker thread. `label` names the thread and log lines.
    pub fn new(label: impl Into<String>) -> Result<Arc<Self>> {
        let label = label.into();
        let (sender, receiver) = mpsc::channel::<Command>();
        let thread_label = label.clone();
        let worker = thread::Builder::new()
            .name(format!("tb-queue-{}", label))
            .spawn(move || {
                while let Ok(command) = receiver.recv() {
                    match command {
                        Command::Run(job) => {
                            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                                error!(target: "tb_storage", queue = %thread_label, "queued job panicked");
                            }
                        }
                        Command::Shutdown => break,
                    }
                }
                debug!(target: "tb_storage", queue = %thread_label, "work queue stopped");
            })?;
        let worker_id = worker.thread().id();

        Ok(Arc::new(WorkQueue {
            label,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            worker_id,
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Enqueue `job` without waiting for it.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        match sender.as_ref() {
            Some(sender) => sender
                .send(Command::Run(Box::new(job)))
                .map_err(|_| StorageError::QueueClosed(self.label.clone())),
            None => Err(StorageError::QueueClosed(self.label.clone())),
        }
    }

    /// Run `job` after everything submitted so far and wait for its result.
    ///
    /// Called from the worker itself, the job runs inline instead of
    /// deadlocking.
    pub fn sync<F, R>(&self, job: F) -> Result<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_worker_thread() {
            return Ok(job());
        }
        let (tx, rx) = mpsc::sync_channel(1);
        self.submit(move || {
            let _ = tx.send(job());
        })?;
        // a dropped sender means the job panicked or the queue shut down
        rx.recv()
            .map_err(|_| StorageError::QueueClosed(self.label.clone()))
    }

    /// Block until every job submitted before this call has run.
    pub fn flush(&self) -> Result<()> {
        self.sync(|| ())
    }

    /// Stop accepting jobs, drain the queue and join the worker.
    pub fn shutdown(&self) {
        if let Some(sender) = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = sender.send(Command::Shutdown);
        }
        if self.is_worker_thread() {
            // the worker exits on its own once it reads Shutdown
            return;
        }
        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = worker.join();
        }
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

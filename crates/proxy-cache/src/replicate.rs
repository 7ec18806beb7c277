//! Bounded background replication to the remote tier
//!
//! Every committed write is offered to a fixed-size worker pool through a
//! bounded queue. A full queue drops the job (logged) rather than letting
//! write-heavy bursts accumulate unbounded outstanding network work. Jobs
//! re-read the committed bytes from the local store, so the writer's input
//! stream is never consumed twice. Failures are logged and go nowhere else.

use crate::backend::HttpBackend;
use disk_blob_store::DiskStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

/// Sizing for the replication worker pool
#[derive(Debug, Clone, Copy)]
pub struct ReplicationOptions {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

struct Job {
    key: String,
}

pub(crate) struct Replicator {
    tx: mpsc::Sender<Job>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Replicator {
    pub(crate) fn spawn(
        backend: Arc<HttpBackend>,
        store: Arc<DiskStore>,
        options: ReplicationOptions,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(options.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        for _ in 0..options.workers.max(1) {
            let rx = Arc::clone(&rx);
            let backend = Arc::clone(&backend);
            let store = Arc::clone(&store);
            let pending = Arc::clone(&pending);
            let idle = Arc::clone(&idle);
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else { break };
                    run_job(&backend, &store, &job).await;
                    pending.fetch_sub(1, Ordering::AcqRel);
                    idle.notify_waiters();
                }
            });
        }

        Self { tx, pending, idle }
    }

    /// Offer a key for replication. Never blocks and never fails the caller:
    /// a full queue drops the job with a warning.
    pub(crate) fn enqueue(&self, key: &str) {
        self.pending.fetch_add(1, Ordering::AcqRel);
        let job = Job {
            key: key.to_string(),
        };
        if let Err(err) = self.tx.try_send(job) {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            match err {
                TrySendError::Full(job) => {
                    warn!(key = %job.key, "replication queue full, dropping upload")
                }
                TrySendError::Closed(job) => {
                    warn!(key = %job.key, "replication workers gone, dropping upload")
                }
            }
        }
    }

    /// Wait until every queued and in-flight replication has settled.
    pub(crate) async fn flush(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_job(backend: &HttpBackend, store: &DiskStore, job: &Job) {
    match store.get(&job.key, false).await {
        Ok(Some((reader, size_bytes))) => {
            match backend.store(&job.key, size_bytes, reader).await {
                Ok(()) => debug!(key = %job.key, size_bytes, "replicated blob to remote tier"),
                // best-effort by contract: the local write already succeeded
                Err(e) => warn!(key = %job.key, error = %e, "replication attempt failed"),
            }
        }
        Ok(None) => warn!(key = %job.key, "blob evicted before replication could run"),
        Err(e) => warn!(key = %job.key, error = %e, "failed to re-read blob for replication"),
    }
}

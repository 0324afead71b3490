//! Worker threads
//!
//! Each worker pulls tasks off the shared queue until it is closed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Receiver;

use crate::error::Result;
use crate::store::Store;

/// A queued store call
pub(super) struct Task {
    /// Operation name, for logs
    pub(super) op: &'static str,
    pub(super) job: Box<dyn FnOnce(&Store) + Send + 'static>,
}

/// Per-worker counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: usize,
    pub processed: u64,
    pub panics: u64,
}

#[derive(Debug, Default)]
pub(super) struct WorkerCounters {
    processed: AtomicU64,
    panics: AtomicU64,
}

pub(super) struct Worker {
    pub(super) id: usize,
    pub(super) counters: Arc<WorkerCounters>,
    pub(super) handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker serving `queue` against `store`
    pub(super) fn spawn(id: usize, queue: Receiver<Task>, store: Arc<Store>) -> Result<Self> {
        let counters = Arc::new(WorkerCounters::default());
        let thread_counters = Arc::clone(&counters);

        let handle = thread::Builder::new()
            .name(format!("minikv-worker-{}", id))
            .spawn(move || run(id, queue, store, thread_counters))?;

        Ok(Self {
            id,
            counters,
            handle: Some(handle),
        })
    }

    pub(super) fn stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            processed: self.counters.processed.load(Ordering::Relaxed),
            panics: self.counters.panics.load(Ordering::Relaxed),
        }
    }

    /// Wait for the worker to exit
    pub(super) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(worker = self.id, "Worker thread panicked outside a task");
            }
        }
    }
}

fn run(id: usize, queue: Receiver<Task>, store: Arc<Store>, counters: Arc<WorkerCounters>) {
    tracing::debug!(worker = id, "Worker started");

    // recv fails once the queue is closed and drained
    while let Ok(task) = queue.recv() {
        let Task { op, job } = task;
        tracing::trace!(worker = id, op, "Running task");

        // A panicking task drops its reply sender, so the caller sees
        // WorkerDisconnected. The worker keeps serving.
        if panic::catch_unwind(AssertUnwindSafe(|| job(&*store))).is_err() {
            counters.panics.fetch_add(1, Ordering::Relaxed);
            tracing::error!(worker = id, op, "Task panicked");
        }
        counters.processed.fetch_add(1, Ordering::Relaxed);
    }

    tracing::debug!(worker = id, "Worker stopped");
}

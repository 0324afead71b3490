//! Router
//!
//! Owns the task queue and the workers, exposes the store API as
//! queued calls.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::store::{CheckpointStats, Store, StoreStats};
use crate::value::Value;

use super::worker::{Task, Worker, WorkerStats};

/// Router counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterStats {
    pub running: bool,

    /// Tasks accepted since start
    pub submitted: u64,

    /// Tasks waiting in the queue
    pub queue_depth: usize,

    pub workers: Vec<WorkerStats>,
}

/// Reply handle for a submitted call
pub struct Pending<T> {
    reply: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Block until the worker replies
    pub fn wait(self) -> Result<T> {
        self.reply.recv().map_err(|_| KvError::WorkerDisconnected)?
    }
}

/// Worker pool in front of a store
///
/// ## Concurrency:
/// - `sender`: read-locked by submitters, write-locked once by `stop`
/// - Workers share one receiver; crossbeam hands each task to exactly one
pub struct Router {
    store: Arc<Store>,

    /// `None` once stopped
    sender: RwLock<Option<Sender<Task>>>,

    /// For queue depth
    queue: Receiver<Task>,

    workers: Mutex<Vec<Worker>>,

    submitted: AtomicU64,

    running: AtomicBool,
}

impl Router {
    /// Open a store from `config` and start serving it
    pub fn open(config: Config) -> Result<Self> {
        let store = Arc::new(Store::open(config)?);
        Self::start(store)
    }

    /// Start `worker_count` workers over `store`
    ///
    /// Pool size and queue policy come from the store's config.
    pub fn start(store: Arc<Store>) -> Result<Self> {
        let config = store.config();
        config.validate()?;
        let worker_count = config.worker_count;

        let (sender, queue) = match config.queue_capacity {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            match Worker::spawn(id, queue.clone(), Arc::clone(&store)) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Closing the queue lets the ones already spawned exit
                    drop(sender);
                    for worker in &mut workers {
                        worker.join();
                    }
                    return Err(e);
                }
            }
        }

        tracing::info!(
            workers = worker_count,
            queue_capacity = ?config.queue_capacity,
            "Router started"
        );

        Ok(Self {
            store,
            sender: RwLock::new(Some(sender)),
            queue,
            workers: Mutex::new(workers),
            submitted: AtomicU64::new(0),
            running: AtomicBool::new(true),
        })
    }

    /// Queue a call, blocking while a bounded queue is full
    pub fn submit<T, F>(&self, op: &'static str, f: F) -> Result<Pending<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let (task, pending) = Self::task(op, f);
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or(KvError::RouterStopped)?;
        sender.send(task).map_err(|_| KvError::RouterStopped)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(pending)
    }

    /// Queue a call, failing immediately if the queue is full
    pub fn try_submit<T, F>(&self, op: &'static str, f: F) -> Result<Pending<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let (task, pending) = Self::task(op, f);
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or(KvError::RouterStopped)?;
        match sender.try_send(task) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(pending)
            }
            Err(TrySendError::Full(_)) => Err(KvError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(KvError::RouterStopped),
        }
    }

    /// Submit and wait for the result
    pub fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        self.submit(op, f)?.wait()
    }

    fn task<T, F>(op: &'static str, f: F) -> (Task, Pending<T>)
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = channel::bounded(1);
        let job = Box::new(move |store: &Store| {
            // The caller may have dropped its Pending
            let _ = reply_tx.send(f(store));
        });
        (Task { op, job }, Pending { reply: reply_rx })
    }

    // =========================================================================
    // Store API
    // =========================================================================

    pub fn get(&self, key: impl Into<String>) -> Result<Option<Value>> {
        let key = key.into();
        self.call("get", move |store| store.get(&key))
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        self.call("set", move |store| store.set(key, value))
    }

    pub fn delete(&self, key: impl Into<String>) -> Result<bool> {
        let key = key.into();
        self.call("delete", move |store| store.delete(&key))
    }

    pub fn exists(&self, key: impl Into<String>) -> Result<bool> {
        let key = key.into();
        self.call("exists", move |store| Ok(store.exists(&key)))
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.call("keys", |store| Ok(store.keys()))
    }

    pub fn values(&self) -> Result<Vec<Value>> {
        self.call("values", |store| Ok(store.values()))
    }

    pub fn items(&self) -> Result<Vec<(String, Value)>> {
        self.call("items", |store| Ok(store.items()))
    }

    pub fn size(&self) -> Result<usize> {
        self.call("size", |store| Ok(store.size()))
    }

    pub fn update<I, K, V>(&self, batch: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let batch: Vec<(String, Value)> = batch
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.call("update", move |store| store.update(batch))
    }

    pub fn clear(&self) -> Result<()> {
        self.call("clear", |store| store.clear())
    }

    pub fn checkpoint(&self) -> Result<CheckpointStats> {
        self.call("checkpoint", |store| store.checkpoint())
    }

    pub fn store_stats(&self) -> Result<StoreStats> {
        self.call("stats", |store| Ok(store.stats()))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stop accepting calls, drain the queue, join workers, close the store
    ///
    /// Idempotent. Calls submitted afterwards fail with `RouterStopped`.
    pub fn stop(&self) -> Result<()> {
        let sender = self.sender.write().take();
        if sender.is_none() {
            return Ok(());
        }
        self.running.store(false, Ordering::SeqCst);

        // Disconnecting the queue ends each worker once it is empty
        drop(sender);
        let mut workers = self.workers.lock();
        for worker in workers.iter_mut() {
            worker.join();
        }

        let processed: u64 = workers.iter().map(|w| w.stats().processed).sum();
        tracing::info!(
            submitted = self.submitted.load(Ordering::Relaxed),
            processed,
            "Router stopped"
        );

        self.store.close()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            running: self.is_running(),
            submitted: self.submitted.load(Ordering::Relaxed),
            queue_depth: self.queue.len(),
            workers: self.workers.lock().iter().map(Worker::stats).collect(),
        }
    }

    /// The store being served
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("Router shutdown failed: {}", e);
        }
    }
}

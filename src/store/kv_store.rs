//! Key-value store operations and recovery

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::error::Result;
use crate::lock::{LockManager, LockMode};
use crate::persistence::{PersistenceBackend, SnapshotFile};
use crate::value::Value;
use crate::wal::{Operation, Wal};

use super::StoreStats;

/// The in-memory key-value store
///
/// ## Concurrency Model: per-key locking under a store-wide barrier
///
/// - **Key operations** (get/set/delete/update): hold `barrier` shared, then
///   the key lock(s). Operations on different keys never wait on each other
///   except while writing their WAL frame; the fsync that follows is shared
///   by every append waiting on it (group commit inside `Wal`).
/// - **Store-wide operations** (clear, keys/values/items, checkpoint
///   staging): hold `barrier` exclusively, which waits for in-flight key
///   operations to finish. `clear` is the rare, expensive one.
/// - **Checkpoints**: serialized by the `backend` mutex. The barrier is only
///   held while changed keys are copied into the backend; the file write
///   happens after it is released.
///
/// Lock order is always backend → barrier → key locks (sorted) → WAL.
pub struct Store {
    /// Store configuration
    pub(super) config: Config,

    /// Live entries
    pub(super) map: DashMap<String, Value>,

    /// Per-key locks
    pub(super) locks: LockManager,

    /// Write-ahead log (internal writer lock)
    pub(super) wal: Wal,

    /// Shared for key operations, exclusive for store-wide ones
    pub(super) barrier: RwLock<()>,

    /// Checkpoint target; holding this mutex is holding the checkpoint
    pub(super) backend: Mutex<Box<dyn PersistenceBackend>>,

    /// Keys changed since the last checkpoint
    pub(super) dirty: DashSet<String>,

    /// A clear happened since the last checkpoint
    pub(super) cleared: AtomicBool,

    /// Sequence covered by the last checkpoint
    pub(super) checkpoint_seq: AtomicU64,

    closed: AtomicBool,
}

impl Store {
    /// Open or create a store using the snapshot file from `config`
    pub fn open(config: Config) -> Result<Self> {
        let backend = SnapshotFile::new(config.snapshot_file());
        Self::open_with_backend(config, Box::new(backend))
    }

    /// Open or create a store on top of any persistence backend
    ///
    /// On startup:
    /// 1. Load the last snapshot
    /// 2. Open the WAL, discarding a torn tail
    /// 3. Replay WAL records newer than the snapshot, in order
    ///
    /// A snapshot that fails validation or a WAL that cannot be read aborts
    /// startup rather than serving partial state.
    pub fn open_with_backend(
        config: Config,
        mut backend: Box<dyn PersistenceBackend>,
    ) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.wal_file();
        if let Some(parent) = wal_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Step 1: Snapshot
        let snapshot = backend.load_all()?;
        let snapshot_seq = backend.checkpoint_seq();
        let snapshot_entries = snapshot.len();

        // Step 2: WAL, numbering continues after the snapshot
        let wal = Wal::open(&wal_path, config.wal_sync, snapshot_seq)?;

        let locks = LockManager::with_prune_threshold(config.lock_prune_threshold);
        let store = Self {
            config,
            map: snapshot.into_iter().collect(),
            locks,
            wal,
            barrier: RwLock::new(()),
            backend: Mutex::new(backend),
            dirty: DashSet::new(),
            cleared: AtomicBool::new(false),
            checkpoint_seq: AtomicU64::new(snapshot_seq),
            closed: AtomicBool::new(false),
        };

        // Step 3: Replay (snapshot first, then newer records)
        let mut replayed = 0u64;
        let mut skipped = 0u64;
        for record in store.wal.replay()? {
            let record = record?;
            if record.seq <= snapshot_seq {
                skipped += 1;
                continue;
            }
            store.apply(record.operation);
            replayed += 1;
        }

        tracing::info!(
            snapshot_entries,
            snapshot_seq,
            replayed,
            skipped,
            entries = store.map.len(),
            next_seq = store.wal.next_seq(),
            "Store recovered"
        );

        Ok(store)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key, `None` if absent
    ///
    /// Takes a shared lock so concurrent readers of one key do not block
    /// each other, while writers to that key are excluded.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let _barrier = self.barrier.read();
        let _guard = self.locks.acquire(key, LockMode::Shared)?;
        Ok(self.map.get(key).map(|entry| entry.value().clone()))
    }

    /// Whether `key` is present
    pub fn exists(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of live entries
    pub fn size(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of all keys, in no particular order
    pub fn keys(&self) -> Vec<String> {
        let _barrier = self.barrier.write();
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Snapshot of all values, in no particular order
    pub fn values(&self) -> Vec<Value> {
        let _barrier = self.barrier.write();
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Snapshot of all entries, in no particular order
    pub fn items(&self) -> Vec<(String, Value)> {
        let _barrier = self.barrier.write();
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set a key to a value
    ///
    /// Steps:
    /// 1. Exclusive lock on the key
    /// 2. Append SET to the WAL (fails → nothing applied)
    /// 3. Insert into the map
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        let key = key.into();
        let seq = {
            let _barrier = self.barrier.read();
            let _guard = self.locks.acquire(&key, LockMode::Exclusive)?;

            let op = Operation::Set {
                key,
                value: value.into(),
            };
            let seq = self.wal.append(&op)?;
            self.apply(op);
            seq
        };

        self.after_write(seq);
        Ok(())
    }

    /// Delete a key, returning whether it existed
    ///
    /// Deleting an absent key is not an error and writes nothing.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let seq = {
            let _barrier = self.barrier.read();
            let _guard = self.locks.acquire(key, LockMode::Exclusive)?;

            if !self.map.contains_key(key) {
                return Ok(false);
            }

            let op = Operation::Delete {
                key: key.to_string(),
            };
            let seq = self.wal.append(&op)?;
            self.apply(op);
            seq
        };

        self.after_write(seq);
        Ok(true)
    }

    /// Set several keys, each atomically
    ///
    /// All keys are locked up front in sorted order, so concurrent batches
    /// with overlapping keys cannot deadlock. Records are appended and
    /// applied key by key in that order; if an append fails, the keys
    /// before it stay applied (they are durable) and the error is returned.
    /// Later duplicates of a key win. Returns the number of keys written.
    pub fn update<I, K, V>(&self, batch: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let batch: BTreeMap<String, Value> = batch
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let last_seq = {
            let _barrier = self.barrier.read();
            let _guards = self.locks.acquire_many(batch.keys(), LockMode::Exclusive)?;

            let mut last_seq = 0;
            for (key, value) in batch {
                let op = Operation::Set { key, value };
                last_seq = self.wal.append(&op)?;
                self.apply(op);
            }
            last_seq
        };

        self.after_write(last_seq);
        Ok(count)
    }

    /// Remove every key
    ///
    /// Takes the store-wide barrier, so it waits for every in-flight key
    /// operation and blocks new ones until done. Use sparingly.
    pub fn clear(&self) -> Result<()> {
        let seq = {
            let _barrier = self.barrier.write();
            let seq = self.wal.append(&Operation::Clear)?;
            self.apply(Operation::Clear);
            seq
        };

        tracing::debug!(seq, "Store cleared");
        self.after_write(seq);
        Ok(())
    }

    /// Apply a logged operation to the map
    ///
    /// Caller holds the key lock (or the barrier exclusively, or is
    /// replaying before the store is shared).
    pub(super) fn apply(&self, op: Operation) {
        match op {
            Operation::Set { key, value } => {
                self.dirty.insert(key.clone());
                self.map.insert(key, value);
            }
            Operation::Delete { key } => {
                self.map.remove(&key);
                self.dirty.insert(key);
            }
            Operation::Clear => {
                self.map.clear();
                self.dirty.clear();
                self.cleared.store(true, Ordering::SeqCst);
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the store gracefully
    ///
    /// Takes a final checkpoint (if configured) and syncs the WAL. Calling
    /// it again is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.config.checkpoint_on_close {
            self.checkpoint()?;
        }
        self.wal.sync()?;

        tracing::info!(entries = self.map.len(), "Store closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.map.len(),
            wal_last_seq: self.wal.last_seq(),
            wal_records: self.wal.record_count(),
            checkpoint_seq: self.checkpoint_seq.load(Ordering::SeqCst),
            dirty_keys: self.dirty.len(),
            lock_count: self.locks.lock_count(),
        }
    }

    /// The lock manager guarding this store's keys
    ///
    /// Locks taken here bypass the store-wide barrier; holding one across a
    /// `clear` does not delay it.
    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }
}

//! Lock Manager
//!
//! Hands out RAII guards over per-key locks.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{KvError, Result};

use super::key_lock::KeyLock;
use super::LockMode;

/// Issues per-key locks
///
/// ## Concurrency:
/// - `table`: sharded map, a key's handle is cloned under its shard lock
/// - Waiting happens on the per-key lock, never while holding a shard
/// - All methods use `&self`
pub struct LockManager {
    /// Key → lock handle, created lazily
    table: DashMap<String, Arc<KeyLock>>,

    /// Table size above which idle entries are pruned
    prune_threshold: usize,
}

impl LockManager {
    /// Default number of entries kept before pruning kicks in
    pub const DEFAULT_PRUNE_THRESHOLD: usize = 4096;

    pub fn new() -> Self {
        Self::with_prune_threshold(Self::DEFAULT_PRUNE_THRESHOLD)
    }

    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            table: DashMap::new(),
            prune_threshold,
        }
    }

    /// Acquire the lock on `key`, blocking until granted
    pub fn acquire(&self, key: &str, mode: LockMode) -> Result<KeyGuard> {
        let lock = self.handle(key);
        lock.lock(mode)
            .map_err(|_| KvError::LockPoisoned(format!("key {:?}", key)))?;

        Ok(KeyGuard {
            key: key.to_string(),
            mode,
            lock,
        })
    }

    /// Acquire locks on several keys in canonical (sorted) order
    ///
    /// Duplicates are collapsed. Every caller locks overlapping keys in the
    /// same order, so concurrent batches cannot wait on each other in a
    /// cycle. If any acquisition fails, the locks already taken are
    /// released before the error is returned.
    pub fn acquire_many<I, K>(&self, keys: I, mode: LockMode) -> Result<MultiKeyGuard>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut sorted: Vec<String> = keys.into_iter().map(|k| k.as_ref().to_string()).collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut held = MultiKeyGuard {
            guards: Vec::with_capacity(sorted.len()),
        };
        for key in &sorted {
            // On error `held` drops here and releases in reverse order
            held.guards.push(self.acquire(key, mode)?);
        }

        Ok(held)
    }

    /// Remove lock entries nobody is holding or waiting on
    ///
    /// Returns the number of entries removed.
    pub fn prune(&self) -> usize {
        let before = self.table.len();
        // Handles are cloned under the shard lock, so a count of 1 means
        // no guard or waiter can be referencing the entry.
        self.table.retain(|_, lock| Arc::strong_count(lock) > 1 || lock.is_poisoned());
        let removed = before.saturating_sub(self.table.len());
        if removed > 0 {
            tracing::trace!(removed, remaining = self.table.len(), "Pruned idle key locks");
        }
        removed
    }

    /// Number of lock entries currently in the table
    pub fn lock_count(&self) -> usize {
        self.table.len()
    }

    /// Get or create the handle for `key`
    fn handle(&self, key: &str) -> Arc<KeyLock> {
        if let Some(existing) = self.table.get(key) {
            return Arc::clone(existing.value());
        }

        if self.table.len() >= self.prune_threshold {
            self.prune();
        }

        let entry = self
            .table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(KeyLock::new()));
        Arc::clone(entry.value())
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A held lock on one key, released on drop
pub struct KeyGuard {
    key: String,
    mode: LockMode,
    lock: Arc<KeyLock>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Release the lock now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // A writer unwinding out of its critical section may have left the
        // key half-updated.
        let poison = self.mode == LockMode::Exclusive && std::thread::panicking();
        if poison {
            tracing::error!(key = %self.key, "Poisoning key lock after panic");
        }
        self.lock.unlock(self.mode, poison);
    }
}

impl std::fmt::Debug for KeyGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyGuard")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Locks held on several keys, released in reverse acquisition order
#[derive(Debug)]
pub struct MultiKeyGuard {
    guards: Vec<KeyGuard>,
}

impl MultiKeyGuard {
    /// Keys held, in acquisition (sorted) order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.guards.iter().map(KeyGuard::key)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release all locks now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for MultiKeyGuard {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

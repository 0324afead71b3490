//! Checkpointing
//!
//! Copy-then-write: changed keys are staged into the backend under a brief
//! store-wide barrier, the backend writes its file without the barrier, and
//! the WAL is pruned up to the covered sequence last.

use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::error::{KvError, Result};
use crate::persistence::PersistenceBackend;

use super::{CheckpointStats, Store};

impl Store {
    /// Write changed state to the backend and prune the WAL
    ///
    /// Blocks concurrent checkpoints. With no writes since the previous
    /// checkpoint this does no I/O and returns the same sequence.
    ///
    /// Failures are `KvError::Persistence`: the in-memory map and the WAL
    /// are untouched and the changes stay staged for the next attempt.
    pub fn checkpoint(&self) -> Result<CheckpointStats> {
        let mut backend = self.backend.lock();
        self.checkpoint_locked(&mut **backend)
    }

    /// Run an automatic checkpoint if enough records piled up
    ///
    /// Skipped when another checkpoint is running. Failures are logged;
    /// the write that triggered this has already succeeded.
    pub(super) fn after_write(&self, seq: u64) {
        let interval = match self.config.checkpoint_interval {
            Some(n) => n,
            None => return,
        };
        if seq.saturating_sub(self.checkpoint_seq.load(Ordering::SeqCst)) < interval {
            return;
        }

        let mut backend = match self.backend.try_lock() {
            Some(b) => b,
            None => return,
        };
        match self.checkpoint_locked(&mut **backend) {
            Ok(stats) => tracing::debug!(
                seq = stats.seq,
                entries = stats.entries,
                "Automatic checkpoint complete"
            ),
            Err(e) => tracing::warn!(
                "Automatic checkpoint failed, durability relies on the WAL until the next one: {}",
                e
            ),
        }
    }

    fn checkpoint_locked(&self, backend: &mut dyn PersistenceBackend) -> Result<CheckpointStats> {
        let started = Instant::now();

        // Step 1: Stage changed keys while no key operation is in flight
        let (seq, keys_staged) = {
            let _barrier = self.barrier.write();
            let seq = self.wal.last_seq();

            let unchanged = self.dirty.is_empty() && !self.cleared.load(Ordering::SeqCst);
            if unchanged && seq == backend.checkpoint_seq() && self.wal.record_count() == 0 {
                return Ok(CheckpointStats {
                    seq,
                    entries: backend.len(),
                    keys_staged: 0,
                    written: false,
                    duration: started.elapsed(),
                });
            }

            let staged = self.stage_changes(backend)?;
            (seq, staged)
        };

        // Step 2: Durable snapshot, outside the barrier
        let written = backend.checkpoint(seq).map_err(|e| {
            tracing::warn!(seq, "Checkpoint write failed: {}", e);
            match e {
                KvError::Persistence(_) => e,
                other => KvError::Persistence(other.to_string()),
            }
        })?;
        self.checkpoint_seq.store(seq, Ordering::SeqCst);

        // Step 3: Records up to `seq` are now redundant
        self.wal.checkpoint(seq).map_err(|e| {
            KvError::Persistence(format!(
                "snapshot at seq {} written but WAL pruning failed: {}",
                seq, e
            ))
        })?;

        let stats = CheckpointStats {
            seq,
            entries: backend.len(),
            keys_staged,
            written,
            duration: started.elapsed(),
        };
        tracing::info!(
            seq = stats.seq,
            entries = stats.entries,
            keys_staged,
            written,
            elapsed_ms = stats.duration.as_millis() as u64,
            "Checkpoint complete"
        );
        Ok(stats)
    }

    /// Copy dirty keys into the backend's staged table
    ///
    /// Caller holds the barrier exclusively. Dirty markers are only cleared
    /// after every key was staged, so a failure here loses nothing.
    fn stage_changes(&self, backend: &mut dyn PersistenceBackend) -> Result<usize> {
        let to_persistence = |e: KvError| match e {
            KvError::Persistence(_) => e,
            other => KvError::Persistence(other.to_string()),
        };

        if self.cleared.load(Ordering::SeqCst) {
            backend.clear().map_err(to_persistence)?;
        }

        let mut staged = 0;
        for key in self.dirty.iter() {
            let result = match self.map.get(key.key()) {
                Some(entry) => backend.upsert(entry.key(), entry.value()),
                None => backend.remove(key.key()),
            };
            result.map_err(to_persistence)?;
            staged += 1;
        }

        self.dirty.clear();
        self.cleared.store(false, Ordering::SeqCst);
        Ok(staged)
    }
}

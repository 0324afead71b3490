//! Store Module
//!
//! The key-value store that coordinates all components.
//!
//! ## Responsibilities
//! - Per-key atomic operations through the lock manager
//! - WAL-then-apply ordering for every mutation
//! - Startup recovery: snapshot, then WAL replay
//! - Checkpoints that stage changed keys into the persistence backend
//!   and prune the WAL
//!
//! ## Write Path
//! ```text
//!   set(k, v)
//!      │
//!      ▼
//!   barrier (shared) ──► key lock (exclusive)
//!      │
//!      ▼
//!   WAL append + fsync ──(error)──► return WalWrite, map untouched
//!      │
//!      ▼
//!   map insert, mark k dirty
//!      │
//!      ▼
//!   release locks ──► automatic checkpoint if due
//! ```

mod checkpoint;
mod kv_store;

use std::time::Duration;

pub use kv_store::Store;

/// Outcome of a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStats {
    /// WAL sequence covered by the snapshot
    pub seq: u64,

    /// Entries in the snapshot
    pub entries: usize,

    /// Keys staged since the previous checkpoint
    pub keys_staged: usize,

    /// Whether the backend wrote a new snapshot. False when its stored copy
    /// already covered everything; the WAL may still have been pruned.
    pub written: bool,

    pub duration: Duration,
}

/// Point-in-time counters for operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Live entries in memory
    pub entries: usize,

    /// Sequence of the last WAL record
    pub wal_last_seq: u64,

    /// Records currently in the WAL file
    pub wal_records: u64,

    /// Sequence covered by the last checkpoint
    pub checkpoint_seq: u64,

    /// Keys changed since the last checkpoint
    pub dirty_keys: usize,

    /// Entries in the lock table
    pub lock_count: usize,
}

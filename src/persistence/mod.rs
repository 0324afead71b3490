//! Persistence Module
//!
//! Checkpointed copy of the store used for fast startup and inspection.
//!
//! ## Policy
//! Changes are **batched at checkpoint time**. `upsert`/`remove`/`clear`
//! only stage changes in the backend's table; `checkpoint` writes the table
//! to disk atomically and reports the WAL sequence it covers. Between two
//! checkpoints the WAL is the only durable copy of recent writes, so the
//! recovery window is "snapshot + WAL records after its sequence".
//!
//! ## Snapshot File Format
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Header (22 bytes)                                      │
//! │   Magic "MKVS" (4) | Version u16 (2)                   │
//! │   CheckpointSeq u64 (8) | EntryCount u64 (8)           │
//! ├────────────────────────────────────────────────────────┤
//! │ Entries (sorted by key)                                │
//! │   [KeyLen u32][ValLen u32][Key utf-8][Value bincode]   │
//! ├────────────────────────────────────────────────────────┤
//! │ Footer (4 bytes)                                       │
//! │   CRC32 of header + entries                            │
//! └────────────────────────────────────────────────────────┘
//! ```

mod snapshot;

use std::collections::HashMap;

use crate::error::Result;
use crate::value::Value;

pub use snapshot::SnapshotFile;

/// A durable key → value table written at checkpoints
///
/// Failures must leave the staged table usable so a later checkpoint can
/// retry; they are reported as `KvError::Persistence`.
pub trait PersistenceBackend: Send {
    /// Read the last checkpoint. Called once, before WAL replay.
    fn load_all(&mut self) -> Result<HashMap<String, Value>>;

    /// Stage a key's current value
    fn upsert(&mut self, key: &str, value: &Value) -> Result<()>;

    /// Stage removal of a key
    fn remove(&mut self, key: &str) -> Result<()>;

    /// Stage removal of every key
    fn clear(&mut self) -> Result<()>;

    /// Durably write the staged table as covering WAL sequence `seq`
    ///
    /// Returns `false` if the stored copy already matched and nothing was
    /// written. On success the backend covers `seq` either way.
    fn checkpoint(&mut self, seq: u64) -> Result<bool>;

    /// Sequence covered by the last successful checkpoint (0 if none)
    fn checkpoint_seq(&self) -> u64;

    /// Value of one key in the staged table, for inspection
    ///
    /// Reflects the last `load_all` plus changes staged since.
    fn load(&self, key: &str) -> Result<Option<Value>>;

    /// Entries in the staged table
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

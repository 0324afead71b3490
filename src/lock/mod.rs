//! Lock Manager Module
//!
//! Per-key locks issued on demand.
//!
//! ## Responsibilities
//! - Exclusive (write) and shared (read) locks per key
//! - FIFO-fair granting so no waiter starves
//! - Deadlock-free multi-key acquisition via canonical (sorted) key order
//! - Lazy creation and opportunistic pruning of lock entries
//!
//! ## Lock Table
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ DashMap<String, Arc<KeyLock>>                │
//! │   "a" ──► KeyLock { serving, next, readers } │
//! │   "b" ──► KeyLock { ... }                    │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A table entry only exists while someone has touched the key recently.
//! Entries whose `Arc` is held by nobody but the table are pruned once the
//! table grows past its threshold; a pruned entry is indistinguishable from
//! one that was never created.
//!
//! Releasing is done by dropping a guard. An exclusive guard dropped during
//! a panic poisons its key: every later acquisition of that key fails with
//! `KvError::LockPoisoned`.

mod key_lock;
mod manager;

pub use manager::{KeyGuard, LockManager, MultiKeyGuard};

/// Lock mode requested for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Many holders at once, excludes writers
    Shared,

    /// Single holder
    Exclusive,
}

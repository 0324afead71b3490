//! # MiniKV
//!
//! A concurrent in-memory key-value store with:
//! - Per-key locking (shared reads, exclusive writes, sorted multi-key locking)
//! - Write-Ahead Logging (WAL) with checksummed records for durability
//! - Checkpointed snapshots and crash recovery with torn-write handling
//! - A fixed worker pool dispatching client calls
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Router                              │
//! │              (FIFO queue + N worker threads)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Store                               │
//! │          (DashMap guarded by the Lock Manager)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │     WAL     │          │ Persistence  │
//!   │  (Append)   │          │  (Snapshot)  │
//!   └─────────────┘          └──────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use minikv::{Config, Store};
//!
//! let store = Store::open(Config::builder().data_dir("./data").build())?;
//! store.set("a", 1)?;
//! store.update([("a", 10), ("c", 3)])?;
//! assert_eq!(store.get("a")?.and_then(|v| v.as_int()), Some(10));
//! store.checkpoint()?;
//! store.close()?;
//! # Ok::<(), minikv::KvError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod value;

pub mod lock;
pub mod persistence;
pub mod router;
pub mod store;
pub mod wal;

mod util;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::{Config, SyncMode};
pub use error::{KvError, Result};
pub use lock::{LockManager, LockMode};
pub use persistence::{PersistenceBackend, SnapshotFile};
pub use router::Router;
pub use store::{CheckpointStats, Store, StoreStats};
pub use value::Value;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of MiniKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

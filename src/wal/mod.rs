//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append a record and fsync it before the mutation is applied; concurrent
//!   appenders share one fsync (group commit)
//! - CRC32 checksums for corruption detection
//! - Sequence numbers for ordering, monotonic across checkpoints
//! - Lazy replay at startup, stopping at the first torn record
//! - Pruning of records already covered by a snapshot
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ Seq (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 2                                │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ Seq (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. The CRC covers seq, len and data; data is
//! the bincode encoding of `(operation, timestamp)`.

mod entry;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalRecord, HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use reader::WalIterator;
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::Wal;

//! Error types for MiniKV
//!
//! Provides a unified error type for all operations. A missing key is not an
//! error: lookups return `Option` and deletes return `bool`.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for MiniKV operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL write failed: {0}")]
    WalWrite(String),

    #[error("Corrupt WAL record at offset {offset}: {reason}")]
    CorruptWalRecord { offset: u64, reason: String },

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Persistence error: {0}")]
    Persistence(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    // -------------------------------------------------------------------------
    // Router Errors
    // -------------------------------------------------------------------------
    #[error("Request queue is full")]
    QueueFull,

    #[error("Router is not running")]
    RouterStopped,

    #[error("Worker disconnected before replying")]
    WorkerDisconnected,
}

impl KvError {
    /// True for failures after which the WAL stays authoritative and the
    /// operation can be retried (a checkpoint that did not make it to disk).
    pub fn is_degraded_durability(&self) -> bool {
        matches!(self, KvError::Persistence(_))
    }
}

impl From<bincode::Error> for KvError {
    fn from(e: bincode::Error) -> Self {
        KvError::Serialization(e.to_string())
    }
}

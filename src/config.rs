//! Configuration for MiniKV
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Main configuration for a MiniKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── wal.log          (write-ahead log)
    ///     └── snapshot.db      (last checkpoint)
    pub data_dir: PathBuf,

    /// Overrides `{data_dir}/wal.log`
    pub wal_path: Option<PathBuf>,

    /// Overrides `{data_dir}/snapshot.db`
    pub snapshot_path: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// How each append is forced to stable storage
    pub wal_sync: SyncMode,

    // -------------------------------------------------------------------------
    // Checkpoint Configuration
    // -------------------------------------------------------------------------
    /// Number of WAL records since the last checkpoint that triggers an
    /// automatic checkpoint. `None` disables automatic checkpoints.
    pub checkpoint_interval: Option<u64>,

    /// Run a final checkpoint when the store is closed
    pub checkpoint_on_close: bool,

    // -------------------------------------------------------------------------
    // Lock Manager Configuration
    // -------------------------------------------------------------------------
    /// Lock table size above which idle lock entries are pruned
    pub lock_prune_threshold: usize,

    // -------------------------------------------------------------------------
    // Worker Pool Configuration
    // -------------------------------------------------------------------------
    /// Number of worker threads serving requests
    pub worker_count: usize,

    /// Request queue capacity. `None` means unbounded (producers never block).
    pub queue_capacity: Option<usize>,
}

/// WAL sync mode. Every append is synced before it returns; this only picks
/// the syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// `fdatasync`: file contents and the metadata needed to read them
    Data,

    /// `fsync`: file contents and all metadata
    Full,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./minikv_data"),
            wal_path: None,
            snapshot_path: None,
            wal_sync: SyncMode::Data,
            checkpoint_interval: Some(10_000),
            checkpoint_on_close: true,
            lock_prune_threshold: 4096,
            worker_count: 4,
            queue_capacity: Some(1024),
        }
    }
}

impl Config {
    const WAL_FILENAME: &'static str = "wal.log";
    const SNAPSHOT_FILENAME: &'static str = "snapshot.db";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolved WAL file path
    pub fn wal_file(&self) -> PathBuf {
        self.wal_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(Self::WAL_FILENAME))
    }

    /// Resolved snapshot file path
    pub fn snapshot_file(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(Self::SNAPSHOT_FILENAME))
    }

    /// Reject settings the store and router cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(KvError::Config("worker_count must be at least 1".into()));
        }
        if self.queue_capacity == Some(0) {
            return Err(KvError::Config(
                "queue_capacity must be at least 1 (use None for unbounded)".into(),
            ));
        }
        if self.checkpoint_interval == Some(0) {
            return Err(KvError::Config(
                "checkpoint_interval must be at least 1 (use None to disable)".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Place the WAL somewhere other than the data directory
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.wal_path = Some(path.into());
        self
    }

    /// Place the snapshot somewhere other than the data directory
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot_path = Some(path.into());
        self
    }

    /// Set the WAL sync mode
    pub fn wal_sync(mut self, mode: SyncMode) -> Self {
        self.config.wal_sync = mode;
        self
    }

    /// Set the automatic checkpoint interval (in WAL records)
    pub fn checkpoint_interval(mut self, records: Option<u64>) -> Self {
        self.config.checkpoint_interval = records;
        self
    }

    /// Enable or disable the checkpoint taken on close
    pub fn checkpoint_on_close(mut self, enabled: bool) -> Self {
        self.config.checkpoint_on_close = enabled;
        self
    }

    /// Set the lock table prune threshold
    pub fn lock_prune_threshold(mut self, entries: usize) -> Self {
        self.config.lock_prune_threshold = entries;
        self
    }

    /// Set the number of worker threads
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Set the request queue capacity (`None` = unbounded)
    pub fn queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

//! WAL Writer
//!
//! Appends records to the WAL file and prunes checkpointed ones.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SyncMode;
use crate::error::{KvError, Result};
use crate::util::{now_millis, sync_parent_dir, temp_path};

use super::entry::encode_frame;
use super::{Operation, WalIterator, WalRecovery};

/// The write-ahead log
///
/// ## Concurrency:
/// - `inner` is the writer lock; appends take it only to write their frame,
///   so records are totally ordered by sequence
/// - `flush` is held by whichever appender is syncing. One fsync covers every
///   record written before it started (group commit); appenders whose record
///   is already covered return without syncing again
/// - Lock order is `flush` → `inner`
pub struct Wal {
    path: PathBuf,
    sync_mode: SyncMode,
    inner: Mutex<WalInner>,
    flush: Mutex<()>,
}

struct WalInner {
    file: File,
    /// Length of the written file contents
    len: u64,
    next_seq: u64,
    /// Records currently in the file
    records: u64,
    /// Highest sequence known to be on stable storage
    synced_seq: u64,
    /// File length and record count as of `synced_seq`
    synced_len: u64,
    synced_records: u64,
    /// Set when a sync failed; the log refuses appends until reopened
    failed: Option<String>,
}

impl WalInner {
    fn mark_synced(&mut self) {
        self.synced_seq = self.next_seq - 1;
        self.synced_len = self.len;
        self.synced_records = self.records;
    }
}

impl Wal {
    /// Open or create the WAL at `path`
    ///
    /// Scans the existing file, truncates a torn tail left by a crash, and
    /// resumes numbering after `max(last record, seq_floor)`. The floor is
    /// the checkpoint sequence of the snapshot, so numbering stays monotonic
    /// after the log was pruned empty.
    pub fn open(path: &Path, sync_mode: SyncMode, seq_floor: u64) -> Result<Self> {
        let scan = WalRecovery::verify(path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        if let Some(reason) = &scan.corrupted_tail {
            tracing::warn!(
                path = %path.display(),
                valid_len = scan.valid_len,
                records = scan.records_recovered,
                "Discarding torn WAL tail: {}",
                reason
            );
            file.set_len(scan.valid_len)?;
        }
        file.sync_all()?;

        let next_seq = scan.last_seq.max(seq_floor) + 1;
        tracing::debug!(
            path = %path.display(),
            records = scan.records_recovered,
            next_seq,
            "WAL opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            sync_mode,
            inner: Mutex::new(WalInner {
                file,
                len: scan.valid_len,
                next_seq,
                records: scan.records_recovered,
                synced_seq: next_seq - 1,
                synced_len: scan.valid_len,
                synced_records: scan.records_recovered,
                failed: None,
            }),
            flush: Mutex::new(()),
        })
    }

    /// Append a record and force it to stable storage
    ///
    /// Returns the record's sequence number once it is durable. If the
    /// write fails, the file is cut back to its previous length, the
    /// sequence number is not consumed, and `KvError::WalWrite` is returned.
    /// If the sync fails, every record it covered is cut off, all of their
    /// appenders get `KvError::WalWrite`, and later appends are refused.
    pub fn append(&self, operation: &Operation) -> Result<u64> {
        let seq = self.write_frame(operation)?;
        self.wait_durable(seq, operation)?;
        Ok(seq)
    }

    /// Write one frame under the writer lock, without syncing
    fn write_frame(&self, operation: &Operation) -> Result<u64> {
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.failed {
            return Err(KvError::WalWrite(format!(
                "log is unusable after a failed sync: {}",
                reason
            )));
        }

        let seq = inner.next_seq;
        let frame = encode_frame(seq, operation, now_millis())?;

        if let Err(e) = inner.file.write_all(&frame) {
            let restore_to = inner.len;
            if let Err(rollback) = inner.file.set_len(restore_to) {
                tracing::error!(
                    path = %self.path.display(),
                    "Failed to roll back partial WAL record: {}",
                    rollback
                );
            }
            tracing::warn!(seq, key = ?operation.key(), "WAL append failed: {}", e);
            return Err(KvError::WalWrite(format!(
                "append of seq {} ({}) failed: {}",
                seq,
                operation.name(),
                e
            )));
        }

        inner.len += frame.len() as u64;
        inner.next_seq += 1;
        inner.records += 1;
        Ok(seq)
    }

    /// Block until `seq` is on stable storage, syncing if nobody else is
    fn wait_durable(&self, seq: u64, operation: &Operation) -> Result<()> {
        if self.inner.lock().synced_seq >= seq {
            return Ok(());
        }

        let _flush = self.flush.lock();

        // Step 1: The previous holder may have synced us already
        let (file, target, target_len, target_records) = {
            let inner = self.inner.lock();
            if inner.synced_seq >= seq {
                return Ok(());
            }
            if let Some(reason) = &inner.failed {
                return Err(KvError::WalWrite(format!(
                    "sync covering seq {} ({}) failed: {}",
                    seq,
                    operation.name(),
                    reason
                )));
            }
            let file = inner.file.try_clone().map_err(|e| {
                KvError::WalWrite(format!("cannot sync seq {}: {}", seq, e))
            })?;
            (file, inner.next_seq - 1, inner.len, inner.records)
        };

        // Step 2: Sync without the writer lock; appends keep landing
        let synced = match self.sync_mode {
            SyncMode::Data => file.sync_data(),
            SyncMode::Full => file.sync_all(),
        };

        // Step 3: Publish the result to everyone waiting on this range
        let mut inner = self.inner.lock();
        match synced {
            Ok(()) => {
                inner.synced_seq = target;
                inner.synced_len = target_len;
                inner.synced_records = target_records;
                Ok(())
            }
            Err(e) => {
                let restore_to = inner.synced_len;
                if let Err(rollback) = inner.file.set_len(restore_to) {
                    tracing::error!(
                        path = %self.path.display(),
                        "Failed to cut unsynced WAL records: {}",
                        rollback
                    );
                }
                tracing::error!(
                    path = %self.path.display(),
                    from_seq = inner.synced_seq + 1,
                    through_seq = target,
                    "WAL sync failed, refusing further appends: {}",
                    e
                );
                inner.len = restore_to;
                inner.records = inner.synced_records;
                inner.next_seq = inner.synced_seq + 1;
                inner.failed = Some(e.to_string());
                Err(KvError::WalWrite(format!(
                    "sync of seq {} ({}) failed: {}",
                    seq,
                    operation.name(),
                    e
                )))
            }
        }
    }

    /// Iterate over every record currently in the log, from the start
    ///
    /// Each call starts a fresh pass over the file.
    pub fn replay(&self) -> Result<WalIterator> {
        WalIterator::open(&self.path)
    }

    /// Drop every record with sequence `<= seq`
    ///
    /// Records after `seq` are copied into a temporary file which then
    /// atomically replaces the log. Appends wait while this runs.
    pub fn checkpoint(&self, seq: u64) -> Result<()> {
        let _flush = self.flush.lock();
        let mut inner = self.inner.lock();
        if inner.records == 0 {
            return Ok(());
        }

        let tmp = temp_path(&self.path);
        let mut kept = 0u64;
        let mut dropped = 0u64;
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for record in WalIterator::open(&self.path)? {
                let record = record?;
                if record.seq > seq {
                    out.write_all(&record.encode()?)?;
                    kept += 1;
                } else {
                    dropped += 1;
                }
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }

        if dropped == 0 {
            std::fs::remove_file(&tmp)?;
            return Ok(());
        }

        std::fs::rename(&tmp, &self.path)?;
        sync_parent_dir(&self.path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)?;
        inner.len = file.metadata()?.len();
        inner.file = file;
        inner.records = kept;
        // The rewritten file was synced before the rename
        inner.mark_synced();

        tracing::debug!(through_seq = seq, dropped, kept, "WAL pruned");
        Ok(())
    }

    /// Force the log to stable storage
    pub fn sync(&self) -> Result<()> {
        let _flush = self.flush.lock();
        let mut inner = self.inner.lock();
        inner.file.sync_all()?;
        inner.mark_synced();
        Ok(())
    }

    /// Sequence number of the last appended record (or the floor)
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().next_seq - 1
    }

    /// Sequence number the next append will get
    pub fn next_seq(&self) -> u64 {
        self.inner.lock().next_seq
    }

    /// Records currently in the file
    pub fn record_count(&self) -> u64 {
        self.inner.lock().records
    }

    /// Size of the log file in bytes
    pub fn len_bytes(&self) -> u64 {
        self.inner.lock().len
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

//! WAL Recovery
//!
//! Integrity scan of a WAL file, used at open time and by operators.

use std::path::Path;

use crate::error::{KvError, Result};

use super::WalIterator;

/// Handles WAL inspection after a crash
pub struct WalRecovery;

/// Result of a scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of valid records
    pub records_recovered: u64,

    /// Last valid sequence number (0 if none)
    pub last_seq: u64,

    /// Byte length of the valid prefix of the file
    pub valid_len: u64,

    /// Why the scan stopped early, if it hit a torn or corrupt record
    pub corrupted_tail: Option<String>,
}

impl RecoveryResult {
    /// Whether a torn/corrupt tail follows the valid records
    pub fn was_truncated(&self) -> bool {
        self.corrupted_tail.is_some()
    }
}

impl WalRecovery {
    /// Verify integrity of a WAL file without modifying it
    ///
    /// A corrupt record ends the scan and is reported in
    /// `corrupted_tail`. Other I/O errors are returned.
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let mut result = RecoveryResult::default();
        let mut records = WalIterator::open(path)?;

        for item in records.by_ref() {
            match item {
                Ok(record) => {
                    result.records_recovered += 1;
                    result.last_seq = record.seq;
                }
                Err(KvError::CorruptWalRecord { offset, reason }) => {
                    result.corrupted_tail = Some(format!("offset {}: {}", offset, reason));
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        result.valid_len = records.offset();
        Ok(result)
    }
}

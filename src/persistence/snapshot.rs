//! Snapshot file backend
//!
//! Whole-table snapshot rewritten atomically (temp file + rename) on every
//! checkpoint.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{KvError, Result};
use crate::util::{sync_parent_dir, temp_path};
use crate::value::Value;

use super::PersistenceBackend;

/// Magic bytes identifying a MiniKV snapshot file
const MAGIC: &[u8; 4] = b"MKVS";

/// Current snapshot format version
const VERSION: u16 = 1;

/// Magic (4) + Version (2) + CheckpointSeq (8) + EntryCount (8)
const HEADER_SIZE: usize = 22;

/// CRC32
const FOOTER_SIZE: usize = 4;

/// Snapshot stored in a single file
pub struct SnapshotFile {
    path: PathBuf,
    /// Staged table: last checkpoint plus changes since
    table: HashMap<String, Value>,
    checkpoint_seq: u64,
    /// Staged changes not yet written
    dirty: bool,
}

impl SnapshotFile {
    /// Create a backend for `path`. Nothing is read until `load_all`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: HashMap::new(),
            checkpoint_seq: 0,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse and validate a snapshot image
    fn decode(path: &Path, bytes: &[u8]) -> Result<(u64, HashMap<String, Value>)> {
        let bad = |reason: String| {
            KvError::Persistence(format!("snapshot {}: {}", path.display(), reason))
        };

        if bytes.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(bad(format!("file too short ({} bytes)", bytes.len())));
        }

        let (body, footer) = bytes.split_at(bytes.len() - FOOTER_SIZE);
        let stored_crc = (&footer[..]).get_u32_le();
        let computed_crc = crc32fast::hash(body);
        if stored_crc != computed_crc {
            return Err(bad(format!(
                "checksum mismatch (stored {:#010x}, computed {:#010x})",
                stored_crc, computed_crc
            )));
        }

        let mut buf = body;
        if &buf[..4] != MAGIC {
            return Err(bad(format!("invalid magic {:?}", &buf[..4])));
        }
        buf.advance(4);

        let version = buf.get_u16_le();
        if version != VERSION {
            return Err(bad(format!("unsupported version {}", version)));
        }

        let checkpoint_seq = buf.get_u64_le();
        let count = buf.get_u64_le();

        let mut table = HashMap::new();
        for i in 0..count {
            if buf.remaining() < 8 {
                return Err(bad(format!("entry {} header truncated", i)));
            }
            let key_len = buf.get_u32_le() as usize;
            let val_len = buf.get_u32_le() as usize;
            if buf.remaining() < key_len + val_len {
                return Err(bad(format!("entry {} body truncated", i)));
            }

            let key = std::str::from_utf8(&buf[..key_len])
                .map_err(|e| bad(format!("entry {} key is not utf-8: {}", i, e)))?
                .to_string();
            buf.advance(key_len);

            let value: Value = bincode::deserialize(&buf[..val_len])
                .map_err(|e| bad(format!("entry {} value undecodable: {}", i, e)))?;
            buf.advance(val_len);

            table.insert(key, value);
        }

        if buf.has_remaining() {
            return Err(bad(format!("{} trailing bytes", buf.remaining())));
        }

        Ok((checkpoint_seq, table))
    }

    /// Build the full file image of the staged table
    fn encode(&self, seq: u64) -> Result<BytesMut> {
        let mut keys: Vec<&String> = self.table.keys().collect();
        keys.sort_unstable();

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + FOOTER_SIZE + keys.len() * 32);
        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u64_le(seq);
        buf.put_u64_le(keys.len() as u64);

        for key in keys {
            let value = bincode::serialize(&self.table[key])?;
            buf.put_u32_le(key.len() as u32);
            buf.put_u32_le(value.len() as u32);
            buf.put_slice(key.as_bytes());
            buf.put_slice(&value);
        }

        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);
        Ok(buf)
    }

    /// Write `image` to a temp file, sync it, then rename over the snapshot
    fn write_atomically(&self, image: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = temp_path(&self.path);
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(image)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        sync_parent_dir(&self.path)
    }
}

impl PersistenceBackend for SnapshotFile {
    fn load_all(&mut self) -> Result<HashMap<String, Value>> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No snapshot, starting empty");
                self.table.clear();
                self.checkpoint_seq = 0;
                self.dirty = false;
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(KvError::Persistence(format!(
                    "snapshot {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let (seq, table) = Self::decode(&self.path, &bytes)?;
        tracing::info!(
            path = %self.path.display(),
            entries = table.len(),
            checkpoint_seq = seq,
            "Snapshot loaded"
        );

        self.table = table.clone();
        self.checkpoint_seq = seq;
        self.dirty = false;
        Ok(table)
    }

    fn upsert(&mut self, key: &str, value: &Value) -> Result<()> {
        self.table.insert(key.to_string(), value.clone());
        self.dirty = true;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.table.remove(key).is_some() {
            self.dirty = true;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        if !self.table.is_empty() {
            self.table.clear();
            self.dirty = true;
        }
        Ok(())
    }

    fn checkpoint(&mut self, seq: u64) -> Result<bool> {
        if !self.dirty && seq == self.checkpoint_seq {
            return Ok(false);
        }

        let image = self.encode(seq)?;
        self.write_atomically(&image).map_err(|e| {
            KvError::Persistence(format!(
                "checkpoint of {} failed: {}",
                self.path.display(),
                e
            ))
        })?;

        self.checkpoint_seq = seq;
        self.dirty = false;
        tracing::debug!(
            path = %self.path.display(),
            entries = self.table.len(),
            bytes = image.len(),
            checkpoint_seq = seq,
            "Snapshot written"
        );
        Ok(true)
    }

    fn checkpoint_seq(&self) -> u64 {
        self.checkpoint_seq
    }

    fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.table.get(key).cloned())
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

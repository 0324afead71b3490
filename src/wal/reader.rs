//! WAL Reader
//!
//! Lazy, ordered iteration over the records of a WAL file.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::error::Result;
use crate::util::read_full;

use super::entry::{corrupt, decode_body, parse_header};
use super::{WalRecord, HEADER_SIZE, MAX_PAYLOAD_SIZE};

/// Iterator over WAL records, from the start of the file
///
/// Yields records in file order. The first torn, truncated or
/// checksum-failing record is reported once as
/// `KvError::CorruptWalRecord` and ends the iteration; nothing after it is
/// read. I/O errors are yielded as `KvError::Io`.
pub struct WalIterator {
    reader: Option<BufReader<File>>,
    /// Byte offset just past the last valid record
    offset: u64,
    last_seq: Option<u64>,
    done: bool,
}

impl WalIterator {
    /// Open `path` for reading. A missing file reads as an empty log.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = match File::open(path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            reader,
            offset: 0,
            last_seq: None,
            done: false,
        })
    }

    /// Bytes of valid records consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Sequence number of the last valid record read
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    fn read_next(&mut self) -> Result<Option<WalRecord>> {
        let reader = match self.reader.as_mut() {
            Some(r) => r,
            None => return Ok(None),
        };

        let mut header = [0u8; HEADER_SIZE];
        let got = read_full(reader, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(corrupt(
                self.offset,
                format!("truncated header ({} of {} bytes)", got, HEADER_SIZE),
            ));
        }

        let (seq, crc, len) = parse_header(&header);
        if len > MAX_PAYLOAD_SIZE {
            return Err(corrupt(
                self.offset,
                format!("payload length {} exceeds limit", len),
            ));
        }

        let mut payload = vec![0u8; len as usize];
        let got = read_full(reader, &mut payload)?;
        if got < payload.len() {
            return Err(corrupt(
                self.offset,
                format!("truncated payload ({} of {} bytes)", got, len),
            ));
        }

        let record = decode_body(seq, crc, len, &payload).map_err(|r| corrupt(self.offset, r))?;

        if let Some(prev) = self.last_seq {
            if record.seq <= prev {
                return Err(corrupt(
                    self.offset,
                    format!("sequence {} does not follow {}", record.seq, prev),
                ));
            }
        }

        self.offset += (HEADER_SIZE + payload.len()) as u64;
        self.last_seq = Some(record.seq);
        Ok(Some(record))
    }
}

impl Iterator for WalIterator {
    type Item = Result<WalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}


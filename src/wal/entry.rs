//! WAL Record definitions
//!
//! Defines individual WAL records and their on-disk frame.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};
use crate::util::now_millis;
use crate::value::Value;

/// Frame header: seq (8) + crc (4) + len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload accepted when reading (64 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Mutations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Set a key to a value
    Set { key: String, value: Value },

    /// Remove a key
    Delete { key: String },

    /// Remove every key
    Clear,
}

impl Operation {
    /// Key touched by this operation (`None` for `Clear`)
    pub fn key(&self) -> Option<&str> {
        match self {
            Operation::Set { key, .. } | Operation::Delete { key } => Some(key),
            Operation::Clear => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Set { .. } => "SET",
            Operation::Delete { .. } => "DELETE",
            Operation::Clear => "CLEAR",
        }
    }
}

/// A single record in the WAL
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    /// Sequence number, strictly increasing
    pub seq: u64,

    /// The operation applied
    pub operation: Operation,

    /// Timestamp (unix millis) when the record was created
    pub timestamp: u64,
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    operation: &'a Operation,
    timestamp: u64,
}

#[derive(Deserialize)]
struct Payload {
    operation: Operation,
    timestamp: u64,
}

impl WalRecord {
    /// Create a record stamped with the current time
    pub fn new(seq: u64, operation: Operation) -> Self {
        Self {
            seq,
            operation,
            timestamp: now_millis(),
        }
    }

    /// Encode this record as a complete frame
    pub fn encode(&self) -> Result<Bytes> {
        encode_frame(self.seq, &self.operation, self.timestamp)
    }

    /// Decode one frame from the start of `buf`
    ///
    /// Returns the record and the number of bytes consumed.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < HEADER_SIZE {
            return Err(corrupt(0, "truncated header"));
        }
        let header: &[u8; HEADER_SIZE] = buf[..HEADER_SIZE]
            .try_into()
            .map_err(|_| corrupt(0, "truncated header"))?;
        let (seq, crc, len) = parse_header(header);
        if len > MAX_PAYLOAD_SIZE {
            return Err(corrupt(0, format!("payload length {} exceeds limit", len)));
        }

        let end = HEADER_SIZE + len as usize;
        if buf.len() < end {
            return Err(corrupt(0, "truncated payload"));
        }

        let record = decode_body(seq, crc, len, &buf[HEADER_SIZE..end])
            .map_err(|reason| corrupt(0, reason))?;
        Ok((record, end))
    }
}

/// Build a frame without taking ownership of the operation
pub(crate) fn encode_frame(seq: u64, operation: &Operation, timestamp: u64) -> Result<Bytes> {
    let payload = bincode::serialize(&PayloadRef {
        operation,
        timestamp,
    })?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&l| l <= MAX_PAYLOAD_SIZE)
        .ok_or_else(|| {
            KvError::Serialization(format!("record of {} bytes is too large", payload.len()))
        })?;

    let crc = frame_crc(seq, len, &payload);

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u64_le(seq);
    frame.put_u32_le(crc);
    frame.put_u32_le(len);
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Split a frame header into (seq, crc, len)
pub(crate) fn parse_header(header: &[u8; HEADER_SIZE]) -> (u64, u32, u32) {
    let mut seq = [0u8; 8];
    let mut crc = [0u8; 4];
    let mut len = [0u8; 4];
    seq.copy_from_slice(&header[0..8]);
    crc.copy_from_slice(&header[8..12]);
    len.copy_from_slice(&header[12..16]);
    (
        u64::from_le_bytes(seq),
        u32::from_le_bytes(crc),
        u32::from_le_bytes(len),
    )
}

/// Verify the checksum and decode the payload
pub(crate) fn decode_body(
    seq: u64,
    crc: u32,
    len: u32,
    payload: &[u8],
) -> std::result::Result<WalRecord, String> {
    let computed = frame_crc(seq, len, payload);
    if computed != crc {
        return Err(format!(
            "checksum mismatch (stored {:#010x}, computed {:#010x})",
            crc, computed
        ));
    }

    let body: Payload =
        bincode::deserialize(payload).map_err(|e| format!("undecodable payload: {}", e))?;
    Ok(WalRecord {
        seq,
        operation: body.operation,
        timestamp: body.timestamp,
    })
}

fn frame_crc(seq: u64, len: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&seq.to_le_bytes());
    hasher.update(&len.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> KvError {
    KvError::CorruptWalRecord {
        offset,
        reason: reason.into(),
    }
}

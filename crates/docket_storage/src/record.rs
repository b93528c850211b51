//! Commit log record framing.
//!
//! ```text
//! | magic "DKTL" (4) | payload len u32 LE (4) | crc32 u32 LE (4) | payload |
//! ```
//!
//! The payload is the CBOR encoding of a [`LogRecord`].

use crate::checksum::compute_crc32;
use crate::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Magic bytes opening every record.
pub const RECORD_MAGIC: [u8; 4] = *b"DKTL";

/// Size of the fixed record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 12;

/// A single keyspace mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOp {
    /// Store a value.
    Put {
        /// Target key.
        key: String,
        /// New value.
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// Target key.
        key: String,
    },
}

impl LogOp {
    /// Returns the key this operation touches.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// The mutations of one committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Operations in application order.
    pub ops: Vec<LogOp>,
}

impl LogRecord {
    /// Creates a record from its operations.
    #[must_use]
    pub fn new(ops: Vec<LogOp>) -> Self {
        Self { ops }
    }

    /// Encodes the record with its frame header.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be encoded.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(self, &mut payload)
            .map_err(|e| StorageError::Codec(e.to_string()))?;

        let len = u32::try_from(payload.len())
            .map_err(|_| StorageError::Codec(format!("record too large: {} bytes", payload.len())))?;

        let mut out = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        out.extend_from_slice(&RECORD_MAGIC);
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&compute_crc32(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }
}

/// Outcome of reading one frame from the front of a buffer.
#[derive(Debug)]
pub(crate) enum Frame {
    /// A valid record occupying `len` bytes including the header.
    Record { record: LogRecord, len: usize },
    /// The buffer ends before the frame does.
    Incomplete,
    /// The frame is complete but its checksum does not match.
    BadChecksum { len: usize },
}

/// Reads the frame at the start of `buf`.
pub(crate) fn read_frame(buf: &[u8]) -> StorageResult<Frame> {
    if buf.len() < RECORD_HEADER_SIZE {
        return Ok(Frame::Incomplete);
    }
    if buf[0..4] != RECORD_MAGIC {
        return Err(StorageError::Corrupted(format!(
            "bad record magic {:02x?}",
            &buf[0..4]
        )));
    }

    let payload_len = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    let expected_crc = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let len = RECORD_HEADER_SIZE + payload_len;
    if buf.len() < len {
        return Ok(Frame::Incomplete);
    }

    let payload = &buf[RECORD_HEADER_SIZE..len];
    if compute_crc32(payload) != expected_crc {
        return Ok(Frame::BadChecksum { len });
    }

    let record: LogRecord =
        ciborium::from_reader(payload).map_err(|e| StorageError::Codec(e.to_string()))?;
    Ok(Frame::Record { record, len })
}

//! Record frames.
//!
//! # Format
//! ```text
//! [magic: 4 "BRK1"][version: u16][kind: u8][reserved: u8][payload_len: u32]
//! [payload: payload_len bytes]
//! [crc64: u64 over header + payload]
//! ```
//! All integers little-endian. A frame is either fully valid or rejected;
//! there is no partial read.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use bytes::Bytes;
use crc64fast::Digest;

use crate::error::{PersistenceError, Result};

pub const MAGIC: [u8; 4] = *b"BRK1";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 4 + 2 + 1 + 1 + 4; // 12 bytes
pub const TRAILER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    Head = 1,
    PendingHead = 2,
    Event = 3,
    Snapshot = 4,
    Key = 5,
}

impl RecordKind {
    fn from_u8(raw: u8) -> Result<Self> {
        match raw {
            1 => Ok(RecordKind::Head),
            2 => Ok(RecordKind::PendingHead),
            3 => Ok(RecordKind::Event),
            4 => Ok(RecordKind::Snapshot),
            5 => Ok(RecordKind::Key),
            other => Err(PersistenceError::UnknownRecordKind(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: RecordKind,
    pub payload: Bytes,
}

impl Frame {
    /// Decode and verify, requiring a specific record kind.
    pub fn decode_expecting(bytes: &[u8], kind: RecordKind) -> Result<Bytes> {
        let frame = decode(bytes)?;
        if frame.kind != kind {
            return Err(PersistenceError::InvalidFormat(format!(
                "expected {:?} record, found {:?}",
                kind, frame.kind
            )));
        }
        Ok(frame.payload)
    }
}

pub fn encode(kind: RecordKind, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    buf.extend_from_slice(&MAGIC);
    // Writes into a Vec cannot fail.
    let _ = buf.write_u16::<LittleEndian>(VERSION);
    let _ = buf.write_u8(kind as u8);
    let _ = buf.write_u8(0);
    let _ = buf.write_u32::<LittleEndian>(payload.len() as u32);
    buf.extend_from_slice(payload);

    let mut digest = Digest::new();
    digest.write(&buf);
    let _ = buf.write_u64::<LittleEndian>(digest.sum64());
    buf
}

pub fn decode(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(PersistenceError::Truncated {
            expected: HEADER_SIZE + TRAILER_SIZE,
            found: bytes.len(),
        });
    }

    if bytes[0..4] != MAGIC {
        return Err(PersistenceError::InvalidMagic);
    }

    let version = LittleEndian::read_u16(&bytes[4..6]);
    if version != VERSION {
        return Err(PersistenceError::UnsupportedVersion(version));
    }

    let kind = RecordKind::from_u8(bytes[6])?;
    let payload_len = LittleEndian::read_u32(&bytes[8..12]) as usize;

    let expected_len = HEADER_SIZE + payload_len + TRAILER_SIZE;
    if bytes.len() != expected_len {
        return Err(PersistenceError::Truncated {
            expected: expected_len,
            found: bytes.len(),
        });
    }

    let body_end = HEADER_SIZE + payload_len;
    let stored = LittleEndian::read_u64(&bytes[body_end..]);

    let mut digest = Digest::new();
    digest.write(&bytes[..body_end]);
    let computed = digest.sum64();

    if stored != computed {
        return Err(PersistenceError::ChecksumMismatch {
            expected: stored,
            found: computed,
        });
    }

    Ok(Frame {
        kind,
        payload: Bytes::copy_from_slice(&bytes[HEADER_SIZE..body_end]),
    })
}

use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid magic bytes in frame header")]
    InvalidMagic,
    #[error("Unsupported frame version {0}")]
    UnsupportedVersion(u16),
    #[error("Unknown record kind {0}")]
    UnknownRecordKind(u8),
    #[error("Frame truncated: expected {expected} bytes, found {found}")]
    Truncated {
        expected: usize,
        found: usize,
    },
    #[error("Checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch {
        expected: u64,
        found: u64,
    },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

//! Durable file primitives.
//!
//! # Guarantees
//! - `write_frame_replace`: readers see either the old or the new record
//! - `write_frame_create`: succeeds for exactly one writer per path
//! - Both fsync the file and its parent directory before returning

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::error::Result;
use crate::frame::{self, Frame, RecordKind};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn tmp_path(target: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.{}.tmp", std::process::id(), n));
    target.with_file_name(name)
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    // Directory fsync is not supported everywhere; best effort.
    match File::open(dir) {
        Ok(handle) => {
            let _ = handle.sync_all();
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn write_tmp(target: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(target);
    let mut file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
    file.write_all(bytes)?;
    file.sync_data()?;
    Ok(tmp)
}

/// Atomically write or overwrite a framed record.
pub fn write_frame_replace(path: &Path, kind: RecordKind, payload: &[u8]) -> Result<()> {
    let tmp = write_tmp(path, &frame::encode(kind, payload))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    if let Some(parent) = path.parent() {
        sync_dir(parent)?;
    }
    Ok(())
}

/// Write a framed record only if nothing exists at `path`.
///
/// Returns `false` when the target already exists. The hard link makes the
/// fully written file appear under its final name in one step.
pub fn write_frame_create(path: &Path, kind: RecordKind, payload: &[u8]) -> Result<bool> {
    let tmp = write_tmp(path, &frame::encode(kind, payload))?;
    let linked = fs::hard_link(&tmp, path);
    let _ = fs::remove_file(&tmp);

    match linked {
        Ok(()) => {
            if let Some(parent) = path.parent() {
                sync_dir(parent)?;
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read and verify a framed record; `None` if the file does not exist.
pub fn read_frame(path: &Path, kind: RecordKind) -> Result<Option<Bytes>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Frame::decode_expecting(&buf, kind).map(Some)
}

/// Remove a file; returns whether it existed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            if let Some(parent) = path.parent() {
                sync_dir(parent)?;
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use tempfile::tempdir;

    #[test]
    fn test_create_only_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/PENDING");

        assert!(write_frame_create(&path, RecordKind::PendingHead, b"first").unwrap());
        assert!(!write_frame_create(&path, RecordKind::PendingHead, b"second").unwrap());

        let payload = read_frame(&path, RecordKind::PendingHead).unwrap().unwrap();
        assert_eq!(&payload[..], b"first");
    }

    #[test]
    fn test_replace_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("HEAD");

        write_frame_replace(&path, RecordKind::Head, b"1").unwrap();
        write_frame_replace(&path, RecordKind::Head, b"2").unwrap();

        let payload = read_frame(&path, RecordKind::Head).unwrap().unwrap();
        assert_eq!(&payload[..], b"2");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("HEAD");
        write_frame_replace(&path, RecordKind::Head, b"x").unwrap();
        write_frame_create(&path, RecordKind::Head, b"y").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["HEAD".to_string()]);
    }

    #[test]
    fn test_missing_file_reads_none() {
        let dir = tempdir().unwrap();
        assert!(read_frame(&dir.path().join("nope"), RecordKind::Head).unwrap().is_none());
        assert!(!remove_if_exists(&dir.path().join("nope")).unwrap());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("HEAD");
        write_frame_replace(&path, RecordKind::Head, b"12345678").unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            read_frame(&path, RecordKind::Head),
            Err(PersistenceError::ChecksumMismatch { .. })
        ));
    }
}

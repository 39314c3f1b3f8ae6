//! Directory layout of a file-backed brook store.
//!
//! ```text
//! <root>/brooks/<hex(type)>/<hex(id)>/
//!     HEAD
//!     PENDING
//!     events/<position:020>.evt
//!     snapshots/<fingerprint hex>/<position:020>.snap
//! ```
//! Key components are hex-encoded so any string that is a valid brook key
//! maps to a valid file name, and the key can be recovered from the path.
//! A component longer than `MAX_INLINE_COMPONENT` bytes would overflow the
//! file name limit once encoded; it is stored as `~<blake3 hex>` instead and
//! the brook directory carries a `KEY` record holding the full key.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use brook_kernel::{BrookKey, BrookPosition, ReducerSetFingerprint};

use crate::error::{PersistenceError, Result};
use crate::frame::RecordKind;
use crate::fs as durable;

const BROOKS_DIR: &str = "brooks";
const HEAD_FILE: &str = "HEAD";
const PENDING_FILE: &str = "PENDING";
const EVENTS_DIR: &str = "events";
const SNAPSHOTS_DIR: &str = "snapshots";
const EVENT_EXT: &str = "evt";
const SNAPSHOT_EXT: &str = "snap";
const KEY_FILE: &str = "KEY";

/// Longest component (in bytes) kept as a hex directory name.
pub const MAX_INLINE_COMPONENT: usize = 100;
const HASHED_PREFIX: char = '~';

#[derive(Debug, Clone)]
pub struct BrookLayout {
    root: PathBuf,
}

impl BrookLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn brook_dir(&self, key: &BrookKey) -> PathBuf {
        self.root
            .join(BROOKS_DIR)
            .join(component_dir(key.brook_type()))
            .join(component_dir(key.id()))
    }

    pub fn key_path(&self, key: &BrookKey) -> PathBuf {
        self.brook_dir(key).join(KEY_FILE)
    }

    /// Write the `KEY` record for a brook whose directory names are hashed.
    ///
    /// Must run before any other record of the brook is written so that
    /// `list_brooks` can always name the directory it finds.
    pub fn ensure_brook(&self, key: &BrookKey) -> Result<()> {
        if !is_hashed_key(key) {
            return Ok(());
        }
        let path = self.key_path(key);
        if path.exists() {
            return Ok(());
        }
        durable::write_frame_create(&path, RecordKind::Key, key.to_string().as_bytes())?;
        Ok(())
    }

    pub fn head_path(&self, key: &BrookKey) -> PathBuf {
        self.brook_dir(key).join(HEAD_FILE)
    }

    pub fn pending_path(&self, key: &BrookKey) -> PathBuf {
        self.brook_dir(key).join(PENDING_FILE)
    }

    pub fn events_dir(&self, key: &BrookKey) -> PathBuf {
        self.brook_dir(key).join(EVENTS_DIR)
    }

    pub fn event_path(&self, key: &BrookKey, position: BrookPosition) -> PathBuf {
        self.events_dir(key)
            .join(format!("{:020}.{}", position.value(), EVENT_EXT))
    }

    pub fn snapshots_dir(&self, key: &BrookKey, fingerprint: &ReducerSetFingerprint) -> PathBuf {
        self.brook_dir(key)
            .join(SNAPSHOTS_DIR)
            .join(fingerprint.to_hex())
    }

    pub fn snapshot_path(
        &self,
        key: &BrookKey,
        fingerprint: &ReducerSetFingerprint,
        position: BrookPosition,
    ) -> PathBuf {
        self.snapshots_dir(key, fingerprint)
            .join(format!("{:020}.{}", position.value(), SNAPSHOT_EXT))
    }

    /// Positions of the event files present for `key`, ascending.
    pub fn event_positions(&self, key: &BrookKey) -> Result<Vec<BrookPosition>> {
        list_positions(&self.events_dir(key), EVENT_EXT)
    }

    /// Positions of the snapshots stored for `key` under `fingerprint`, ascending.
    pub fn snapshot_positions(
        &self,
        key: &BrookKey,
        fingerprint: &ReducerSetFingerprint,
    ) -> Result<Vec<BrookPosition>> {
        list_positions(&self.snapshots_dir(key, fingerprint), SNAPSHOT_EXT)
    }

    /// Every snapshot for `key` regardless of fingerprint.
    pub fn all_snapshots(&self, key: &BrookKey) -> Result<Vec<(ReducerSetFingerprint, BrookPosition)>> {
        let dir = self.brook_dir(key).join(SNAPSHOTS_DIR);
        let mut found = Vec::new();
        for entry in read_dir_if_exists(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(fingerprint) = name.to_str().and_then(ReducerSetFingerprint::from_hex) else {
                continue;
            };
            for position in list_positions(&entry.path(), SNAPSHOT_EXT)? {
                found.push((fingerprint, position));
            }
        }
        found.sort();
        Ok(found)
    }

    /// All brooks that have a directory under the root, sorted by key.
    ///
    /// A hashed directory without its `KEY` record is the residue of a
    /// create that never finished and is skipped.
    pub fn list_brooks(&self) -> Result<Vec<BrookKey>> {
        let mut keys = Vec::new();
        for type_entry in read_dir_if_exists(&self.root.join(BROOKS_DIR))? {
            let type_entry = type_entry?;
            let type_name = type_entry.file_name();
            for id_entry in read_dir_if_exists(&type_entry.path())? {
                let id_entry = id_entry?;
                let id_name = id_entry.file_name();
                let key = if is_hashed_name(&type_name) || is_hashed_name(&id_name) {
                    match read_key_record(&id_entry.path())? {
                        Some(key) => key,
                        None => continue,
                    }
                } else {
                    BrookKey::new(decode_component(&type_name)?, decode_component(&id_name)?)
                        .map_err(|e| PersistenceError::InvalidFormat(e.to_string()))?
                };
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn component_dir(component: &str) -> String {
    if component.len() <= MAX_INLINE_COMPONENT {
        hex::encode(component)
    } else {
        format!("{}{}", HASHED_PREFIX, blake3::hash(component.as_bytes()).to_hex())
    }
}

fn is_hashed_key(key: &BrookKey) -> bool {
    key.brook_type().len() > MAX_INLINE_COMPONENT || key.id().len() > MAX_INLINE_COMPONENT
}

fn is_hashed_name(name: &std::ffi::OsStr) -> bool {
    name.to_str().map_or(false, |n| n.starts_with(HASHED_PREFIX))
}

fn read_key_record(brook_dir: &Path) -> Result<Option<BrookKey>> {
    let Some(payload) = durable::read_frame(&brook_dir.join(KEY_FILE), RecordKind::Key)? else {
        return Ok(None);
    };
    let raw = std::str::from_utf8(&payload)
        .map_err(|e| PersistenceError::InvalidFormat(e.to_string()))?;
    BrookKey::parse(raw)
        .map(Some)
        .map_err(|e| PersistenceError::InvalidFormat(e.to_string()))
}

fn decode_component(name: &std::ffi::OsStr) -> Result<String> {
    let raw = name
        .to_str()
        .ok_or_else(|| PersistenceError::InvalidFormat(format!("non-utf8 entry {:?}", name)))?;
    let bytes = hex::decode(raw)
        .map_err(|e| PersistenceError::InvalidFormat(format!("{}: {}", raw, e)))?;
    String::from_utf8(bytes).map_err(|e| PersistenceError::InvalidFormat(e.to_string()))
}

/// Parse `<position:020>.<ext>` file names. Anything else (temp files) is ignored.
fn parse_position(name: &str, ext: &str) -> Option<BrookPosition> {
    let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
    if stem.len() != 20 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse::<i64>().ok().and_then(|v| BrookPosition::new(v).ok())
}

fn list_positions(dir: &Path, ext: &str) -> Result<Vec<BrookPosition>> {
    let mut positions = Vec::new();
    for entry in read_dir_if_exists(dir)? {
        let entry = entry?;
        if let Some(position) = entry.file_name().to_str().and_then(|n| parse_position(n, ext)) {
            positions.push(position);
        }
    }
    positions.sort();
    Ok(positions)
}

fn read_dir_if_exists(dir: &Path) -> Result<Vec<io::Result<fs::DirEntry>>> {
    match fs::read_dir(dir) {
        Ok(iter) => Ok(iter.collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! File-backed store.
//!
//! One directory per brook (see `brook_persistence::layout`). Every record is
//! a checksummed frame holding a bincode-encoded record. Conditional creates
//! use temp file + hard link, replacements use temp file + rename, and both
//! fsync before returning. There is no transactional batch, so appends take
//! the two-phase path and rely on recovery after a crash.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use brook_kernel::{BrookKey, BrookPosition, ReducerSetFingerprint};
use brook_persistence::fs as pfs;
use brook_persistence::{BrookLayout, PersistenceError, RecordKind};

use super::{
    BrookStore, EventRecord, HeadRecord, PendingHeadRecord, SnapshotDescriptor, SnapshotRecord,
    StoreError, StoreResult, StoreStatus,
};

#[derive(Debug, Clone)]
pub struct FileStore {
    layout: BrookLayout,
}

impl FileStore {
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| StoreError::internal(format!("create {}: {}", root.display(), e)))?;
        Ok(Self {
            layout: BrookLayout::new(root),
        })
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Every brook with a directory in this store.
    pub async fn list_brooks(&self) -> StoreResult<Vec<BrookKey>> {
        self.blocking(|layout| layout.list_brooks().map_err(persistence_error))
            .await
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&BrookLayout) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let layout = self.layout.clone();
        tokio::task::spawn_blocking(move || f(&layout))
            .await
            .map_err(|e| StoreError::internal(format!("blocking task failed: {}", e)))?
    }
}

/// Linux `ENAMETOOLONG`; `io::ErrorKind::InvalidFilename` is not stable yet.
const NAME_TOO_LONG: i32 = 36;

fn persistence_error(err: PersistenceError) -> StoreError {
    match err {
        PersistenceError::IoError(e) => io_error(e),
        // Corrupt or foreign data will not get better on retry.
        other => StoreError::new(StoreStatus::Other(422), other.to_string()),
    }
}

fn io_error(err: io::Error) -> StoreError {
    let permanent = matches!(
        err.kind(),
        io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidData
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::Unsupported
    ) || err.raw_os_error() == Some(NAME_TOO_LONG);
    if permanent {
        StoreError::new(StoreStatus::Other(400), format!("io: {}", err))
    } else {
        StoreError::internal(format!("io: {}", err))
    }
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::new(StoreStatus::Other(422), format!("encode: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| StoreError::new(StoreStatus::Other(422), format!("decode: {}", e)))
}

fn read_record<T: DeserializeOwned>(path: &Path, kind: RecordKind) -> StoreResult<Option<T>> {
    match pfs::read_frame(path, kind).map_err(persistence_error)? {
        Some(payload) => decode(&payload).map(Some),
        None => Ok(None),
    }
}

#[async_trait]
impl BrookStore for FileStore {
    async fn read_head(&self, key: &BrookKey) -> StoreResult<Option<HeadRecord>> {
        let key = key.clone();
        self.blocking(move |layout| read_record(&layout.head_path(&key), RecordKind::Head))
            .await
    }

    async fn write_head(&self, key: &BrookKey, head: HeadRecord) -> StoreResult<()> {
        let key = key.clone();
        self.blocking(move |layout| {
            let payload = encode(&head)?;
            layout.ensure_brook(&key).map_err(persistence_error)?;
            pfs::write_frame_replace(&layout.head_path(&key), RecordKind::Head, &payload)
                .map_err(persistence_error)
        })
        .await
    }

    async fn read_pending_head(&self, key: &BrookKey) -> StoreResult<Option<PendingHeadRecord>> {
        let key = key.clone();
        self.blocking(move |layout| {
            read_record(&layout.pending_path(&key), RecordKind::PendingHead)
        })
        .await
    }

    async fn create_pending_head(
        &self,
        key: &BrookKey,
        pending: &PendingHeadRecord,
    ) -> StoreResult<()> {
        let key = key.clone();
        let payload = encode(pending)?;
        self.blocking(move |layout| {
            layout.ensure_brook(&key).map_err(persistence_error)?;
            let created =
                pfs::write_frame_create(&layout.pending_path(&key), RecordKind::PendingHead, &payload)
                    .map_err(persistence_error)?;
            if created {
                Ok(())
            } else {
                Err(StoreError::conflict(format!("pending head already exists for {}", key)))
            }
        })
        .await
    }

    async fn delete_pending_head(&self, key: &BrookKey) -> StoreResult<()> {
        let key = key.clone();
        self.blocking(move |layout| {
            pfs::remove_if_exists(&layout.pending_path(&key))
                .map(|_| ())
                .map_err(persistence_error)
        })
        .await
    }

    async fn write_events(&self, key: &BrookKey, events: &[EventRecord]) -> StoreResult<()> {
        let key = key.clone();
        let events = events.to_vec();
        self.blocking(move |layout| {
            layout.ensure_brook(&key).map_err(persistence_error)?;
            for record in &events {
                let path = layout.event_path(&key, record.position);
                let payload = encode(record)?;
                let created = pfs::write_frame_create(&path, RecordKind::Event, &payload)
                    .map_err(persistence_error)?;
                if created {
                    continue;
                }
                let existing: Option<EventRecord> = read_record(&path, RecordKind::Event)?;
                if existing.as_ref() != Some(record) {
                    return Err(StoreError::conflict(format!(
                        "event already exists at position {}",
                        record.position
                    )));
                }
            }
            Ok(())
        })
        .await
    }

    async fn delete_events(
        &self,
        key: &BrookKey,
        from: BrookPosition,
        to: BrookPosition,
    ) -> StoreResult<u64> {
        let key = key.clone();
        self.blocking(move |layout| {
            let mut removed = 0;
            for position in layout.event_positions(&key).map_err(persistence_error)? {
                if position < from || position > to {
                    continue;
                }
                if pfs::remove_if_exists(&layout.event_path(&key, position))
                    .map_err(persistence_error)?
                {
                    removed += 1;
                }
            }
            Ok(removed)
        })
        .await
    }

    async fn query_events(
        &self,
        key: &BrookKey,
        from: BrookPosition,
        to: BrookPosition,
        limit: usize,
    ) -> StoreResult<Vec<EventRecord>> {
        let key = key.clone();
        self.blocking(move |layout| {
            let positions = layout.event_positions(&key).map_err(persistence_error)?;
            let mut records = Vec::new();
            for position in positions
                .into_iter()
                .filter(|p| *p >= from && *p <= to)
                .take(limit)
            {
                // A concurrent rollback may remove a file between listing and reading.
                if let Some(record) =
                    read_record::<EventRecord>(&layout.event_path(&key, position), RecordKind::Event)?
                {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }

    async fn list_snapshots(&self, key: &BrookKey) -> StoreResult<Vec<SnapshotDescriptor>> {
        let key = key.clone();
        self.blocking(move |layout| {
            Ok(layout
                .all_snapshots(&key)
                .map_err(persistence_error)?
                .into_iter()
                .map(|(fingerprint, position)| SnapshotDescriptor {
                    fingerprint,
                    position,
                })
                .collect())
        })
        .await
    }

    async fn read_snapshot(
        &self,
        key: &BrookKey,
        fingerprint: &ReducerSetFingerprint,
        position: BrookPosition,
    ) -> StoreResult<Option<SnapshotRecord>> {
        let key = key.clone();
        let fingerprint = *fingerprint;
        self.blocking(move |layout| {
            read_record(
                &layout.snapshot_path(&key, &fingerprint, position),
                RecordKind::Snapshot,
            )
        })
        .await
    }

    async fn write_snapshot(&self, record: &SnapshotRecord) -> StoreResult<()> {
        let payload = encode(record)?;
        let key = record.key.clone();
        let path = self
            .layout
            .snapshot_path(&record.key, &record.fingerprint, record.position);
        self.blocking(move |layout| {
            layout.ensure_brook(&key).map_err(persistence_error)?;
            pfs::write_frame_replace(&path, RecordKind::Snapshot, &payload).map_err(persistence_error)
        })
        .await
    }
}

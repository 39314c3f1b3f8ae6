// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Backing store abstraction.
//!
//! The engine only needs a handful of logical operations per brook: point
//! reads of the head and pending marker, conditional writes, a range query
//! over events and, where available, a single-partition transactional batch.
//! Everything is partitioned by `BrookKey`; nothing spans brooks.
//!
//! # Record semantics
//! - `create_pending_head` fails with `Conflict` when a marker already exists
//! - `write_events` creates each record conditionally. Re-writing a record
//!   identical to the stored one is a no-op, so a retried write after a
//!   partial failure converges; a different record at an occupied position is
//!   a `Conflict`
//! - `delete_pending_head` and `delete_events` are idempotent

pub mod file;
pub mod memory;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use brook_kernel::{BrookEvent, BrookKey, BrookPosition, KernelResult, ReducerSetFingerprint};

pub use file::FileStore;
pub use memory::{InMemoryStore, InMemoryStoreOptions, StoreOperation};

/// Committed head of a brook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRecord {
    pub position: BrookPosition,
}

/// Intent marker written before an append's events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingHeadRecord {
    pub previous_head: BrookPosition,
    pub final_position: BrookPosition,
    pub created_at: DateTime<Utc>,
}

/// Persisted form of an event at its assigned position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub position: BrookPosition,
    pub id: String,
    pub source: String,
    pub event_type: String,
    pub data_content_type: String,
    pub data: Vec<u8>,
    pub time: DateTime<Utc>,
}

impl EventRecord {
    /// Fails with `MissingEventTime` when the event was never stamped.
    pub fn from_event(position: BrookPosition, event: &BrookEvent) -> KernelResult<Self> {
        let time = event.require_time()?;
        Ok(Self {
            position,
            id: event.id().to_string(),
            source: event.source().to_string(),
            event_type: event.event_type().to_string(),
            data_content_type: event.data_content_type().to_string(),
            data: event.data().to_vec(),
            time,
        })
    }

    pub fn into_event(self) -> BrookEvent {
        BrookEvent::new(
            self.id,
            self.source,
            self.event_type,
            self.data_content_type,
            self.data,
        )
        .with_time(self.time)
    }

    pub fn approximate_size(&self) -> usize {
        self.id.len()
            + self.source.len()
            + self.event_type.len()
            + self.data_content_type.len()
            + self.data.len()
            + 32
    }
}

/// Serialized model at a position, valid only for its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub key: BrookKey,
    pub fingerprint: ReducerSetFingerprint,
    pub position: BrookPosition,
    pub model: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub fn descriptor(&self) -> SnapshotDescriptor {
        SnapshotDescriptor {
            fingerprint: self.fingerprint,
            position: self.position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotDescriptor {
    pub fingerprint: ReducerSetFingerprint,
    pub position: BrookPosition,
}

/// One step of a transactional batch. All steps target the same brook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    CreateEvent(EventRecord),
    UpsertHead(HeadRecord),
    DeletePendingHead,
}

/// Status of a failed store request, modelled on HTTP codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreStatus {
    NotFound,
    RequestTimeout,
    Conflict,
    PayloadTooLarge,
    TooManyRequests,
    InternalError,
    NotImplemented,
    ServiceUnavailable,
    GatewayTimeout,
    Other(u16),
}

impl StoreStatus {
    pub fn code(self) -> u16 {
        match self {
            StoreStatus::NotFound => 404,
            StoreStatus::RequestTimeout => 408,
            StoreStatus::Conflict => 409,
            StoreStatus::PayloadTooLarge => 413,
            StoreStatus::TooManyRequests => 429,
            StoreStatus::InternalError => 500,
            StoreStatus::NotImplemented => 501,
            StoreStatus::ServiceUnavailable => 503,
            StoreStatus::GatewayTimeout => 504,
            StoreStatus::Other(code) => code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            404 => StoreStatus::NotFound,
            408 => StoreStatus::RequestTimeout,
            409 => StoreStatus::Conflict,
            413 => StoreStatus::PayloadTooLarge,
            429 => StoreStatus::TooManyRequests,
            500 => StoreStatus::InternalError,
            501 => StoreStatus::NotImplemented,
            503 => StoreStatus::ServiceUnavailable,
            504 => StoreStatus::GatewayTimeout,
            other => StoreStatus::Other(other),
        }
    }

    /// Busy, unavailable or timed out: worth another attempt.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            StoreStatus::TooManyRequests
                | StoreStatus::ServiceUnavailable
                | StoreStatus::RequestTimeout
                | StoreStatus::InternalError
                | StoreStatus::GatewayTimeout
        )
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("store status {status}: {message}")]
pub struct StoreError {
    pub status: StoreStatus,
    pub message: String,
    /// Server-supplied hint for when to try again.
    pub retry_after: Option<Duration>,
}

impl StoreError {
    pub fn new(status: StoreStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StoreStatus::Conflict, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreStatus::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreStatus::InternalError, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.status == StoreStatus::Conflict
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait BrookStore: Send + Sync + 'static {
    async fn read_head(&self, key: &BrookKey) -> StoreResult<Option<HeadRecord>>;

    async fn write_head(&self, key: &BrookKey, head: HeadRecord) -> StoreResult<()>;

    async fn read_pending_head(&self, key: &BrookKey) -> StoreResult<Option<PendingHeadRecord>>;

    /// Conditional create; `Conflict` if a marker is already present.
    async fn create_pending_head(&self, key: &BrookKey, pending: &PendingHeadRecord)
        -> StoreResult<()>;

    async fn delete_pending_head(&self, key: &BrookKey) -> StoreResult<()>;

    async fn write_events(&self, key: &BrookKey, events: &[EventRecord]) -> StoreResult<()>;

    /// Delete events in `[from, to]`; returns how many existed.
    async fn delete_events(
        &self,
        key: &BrookKey,
        from: BrookPosition,
        to: BrookPosition,
    ) -> StoreResult<u64>;

    /// Up to `limit` visible events in `[from, to]`, ascending by position.
    async fn query_events(
        &self,
        key: &BrookKey,
        from: BrookPosition,
        to: BrookPosition,
        limit: usize,
    ) -> StoreResult<Vec<EventRecord>>;

    fn supports_transactional_batch(&self) -> bool {
        false
    }

    /// Apply all operations atomically, or none of them.
    async fn execute_batch(&self, _key: &BrookKey, _ops: Vec<BatchOperation>) -> StoreResult<()> {
        Err(StoreError::new(
            StoreStatus::NotImplemented,
            "transactional batches are not supported by this store",
        ))
    }

    async fn list_snapshots(&self, key: &BrookKey) -> StoreResult<Vec<SnapshotDescriptor>>;

    async fn read_snapshot(
        &self,
        key: &BrookKey,
        fingerprint: &ReducerSetFingerprint,
        position: BrookPosition,
    ) -> StoreResult<Option<SnapshotRecord>>;

    async fn write_snapshot(&self, record: &SnapshotRecord) -> StoreResult<()>;
}

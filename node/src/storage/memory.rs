// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-memory store.
//!
//! Behaves like a partitioned document store with single-partition
//! transactional batches. Fault injection, a per-brook visibility limit and
//! per-operation call counters let tests reproduce throttling, crashes
//! between commit steps and read-after-write lag deterministically.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use brook_kernel::{BrookKey, BrookPosition, ReducerSetFingerprint};

use super::{
    BatchOperation, BrookStore, EventRecord, HeadRecord, PendingHeadRecord, SnapshotDescriptor,
    SnapshotRecord, StoreError, StoreResult, StoreStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    ReadHead,
    WriteHead,
    ReadPendingHead,
    CreatePendingHead,
    DeletePendingHead,
    WriteEvents,
    DeleteEvents,
    QueryEvents,
    ExecuteBatch,
    ListSnapshots,
    ReadSnapshot,
    WriteSnapshot,
}

#[derive(Debug, Clone)]
pub struct InMemoryStoreOptions {
    pub transactional_batch: bool,
    /// Requests larger than this fail with 413.
    pub max_request_bytes: Option<usize>,
}

impl Default for InMemoryStoreOptions {
    fn default() -> Self {
        Self {
            transactional_batch: true,
            max_request_bytes: None,
        }
    }
}

#[derive(Default)]
struct Partition {
    head: Option<HeadRecord>,
    pending: Option<PendingHeadRecord>,
    events: BTreeMap<BrookPosition, EventRecord>,
    snapshots: BTreeMap<SnapshotDescriptor, SnapshotRecord>,
    visible_through: Option<BrookPosition>,
}

#[derive(Default)]
struct Inner {
    partitions: HashMap<BrookKey, Partition>,
    faults: HashMap<StoreOperation, VecDeque<StoreError>>,
    lost_responses: HashMap<StoreOperation, VecDeque<StoreError>>,
    calls: HashMap<StoreOperation, u64>,
}

pub struct InMemoryStore {
    options: InMemoryStoreOptions,
    inner: Mutex<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_options(InMemoryStoreOptions::default())
    }

    pub fn with_options(options: InMemoryStoreOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Fail the next `times` calls of `operation` with `error`.
    pub fn fail_next(&self, operation: StoreOperation, error: StoreError, times: usize) {
        let mut inner = self.inner.lock();
        let queue = inner.faults.entry(operation).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    /// Apply the next `times` calls of `operation`, then report `error` as if
    /// the response was lost. Only batches and event writes honor this.
    pub fn lose_next_response(&self, operation: StoreOperation, error: StoreError, times: usize) {
        let mut inner = self.inner.lock();
        let queue = inner.lost_responses.entry(operation).or_default();
        queue.extend(std::iter::repeat(error).take(times));
    }

    pub fn clear_faults(&self) {
        let mut inner = self.inner.lock();
        inner.faults.clear();
        inner.lost_responses.clear();
    }

    /// Hide events after `through` from range queries, as a lagging replica
    /// would. `None` makes everything visible again.
    pub fn set_visible_through(&self, key: &BrookKey, through: Option<BrookPosition>) {
        let mut inner = self.inner.lock();
        inner.partitions.entry(key.clone()).or_default().visible_through = through;
    }

    pub fn call_count(&self, operation: StoreOperation) -> u64 {
        self.inner.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn reset_call_counts(&self) {
        self.inner.lock().calls.clear();
    }

    /// Number of stored events for `key`, visible or not.
    pub fn event_count(&self, key: &BrookKey) -> usize {
        self.inner
            .lock()
            .partitions
            .get(key)
            .map(|p| p.events.len())
            .unwrap_or(0)
    }

    fn enter(&self, operation: StoreOperation) -> StoreResult<parking_lot::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock();
        *inner.calls.entry(operation).or_default() += 1;
        if let Some(error) = inner.faults.get_mut(&operation).and_then(|q| q.pop_front()) {
            return Err(error);
        }
        Ok(inner)
    }

    fn respond(inner: &mut Inner, operation: StoreOperation) -> StoreResult<()> {
        match inner.lost_responses.get_mut(&operation).and_then(|q| q.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn check_size(&self, bytes: usize) -> StoreResult<()> {
        match self.options.max_request_bytes {
            Some(limit) if bytes > limit => Err(StoreError::new(
                StoreStatus::PayloadTooLarge,
                format!("request of {} bytes exceeds limit of {}", bytes, limit),
            )),
            _ => Ok(()),
        }
    }
}

fn insert_event(partition: &mut Partition, record: &EventRecord) -> StoreResult<()> {
    match partition.events.get(&record.position) {
        Some(existing) if existing == record => Ok(()),
        Some(_) => Err(StoreError::conflict(format!(
            "event already exists at position {}",
            record.position
        ))),
        None => {
            partition.events.insert(record.position, record.clone());
            Ok(())
        }
    }
}

#[async_trait]
impl BrookStore for InMemoryStore {
    async fn read_head(&self, key: &BrookKey) -> StoreResult<Option<HeadRecord>> {
        let inner = self.enter(StoreOperation::ReadHead)?;
        Ok(inner.partitions.get(key).and_then(|p| p.head))
    }

    async fn write_head(&self, key: &BrookKey, head: HeadRecord) -> StoreResult<()> {
        let mut inner = self.enter(StoreOperation::WriteHead)?;
        inner.partitions.entry(key.clone()).or_default().head = Some(head);
        Ok(())
    }

    async fn read_pending_head(&self, key: &BrookKey) -> StoreResult<Option<PendingHeadRecord>> {
        let inner = self.enter(StoreOperation::ReadPendingHead)?;
        Ok(inner.partitions.get(key).and_then(|p| p.pending.clone()))
    }

    async fn create_pending_head(
        &self,
        key: &BrookKey,
        pending: &PendingHeadRecord,
    ) -> StoreResult<()> {
        let mut inner = self.enter(StoreOperation::CreatePendingHead)?;
        let partition = inner.partitions.entry(key.clone()).or_default();
        if partition.pending.is_some() {
            return Err(StoreError::conflict(format!("pending head already exists for {}", key)));
        }
        partition.pending = Some(pending.clone());
        Ok(())
    }

    async fn delete_pending_head(&self, key: &BrookKey) -> StoreResult<()> {
        let mut inner = self.enter(StoreOperation::DeletePendingHead)?;
        if let Some(partition) = inner.partitions.get_mut(key) {
            partition.pending = None;
        }
        Ok(())
    }

    async fn write_events(&self, key: &BrookKey, events: &[EventRecord]) -> StoreResult<()> {
        let mut inner = self.enter(StoreOperation::WriteEvents)?;
        self.check_size(events.iter().map(EventRecord::approximate_size).sum())?;

        // Each record is its own conditional create; earlier ones stay written
        // if a later one conflicts.
        let partition = inner.partitions.entry(key.clone()).or_default();
        for record in events {
            insert_event(partition, record)?;
        }
        Self::respond(&mut inner, StoreOperation::WriteEvents)
    }

    async fn delete_events(
        &self,
        key: &BrookKey,
        from: BrookPosition,
        to: BrookPosition,
    ) -> StoreResult<u64> {
        let mut inner = self.enter(StoreOperation::DeleteEvents)?;
        let Some(partition) = inner.partitions.get_mut(key) else {
            return Ok(0);
        };
        if to < from {
            return Ok(0);
        }
        let doomed: Vec<_> = partition.events.range(from..=to).map(|(p, _)| *p).collect();
        for position in &doomed {
            partition.events.remove(position);
        }
        Ok(doomed.len() as u64)
    }

    async fn query_events(
        &self,
        key: &BrookKey,
        from: BrookPosition,
        to: BrookPosition,
        limit: usize,
    ) -> StoreResult<Vec<EventRecord>> {
        let inner = self.enter(StoreOperation::QueryEvents)?;
        let Some(partition) = inner.partitions.get(key) else {
            return Ok(Vec::new());
        };
        let to = match partition.visible_through {
            Some(limit) if limit < to => limit,
            _ => to,
        };
        if to < from {
            return Ok(Vec::new());
        }
        Ok(partition
            .events
            .range(from..=to)
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn supports_transactional_batch(&self) -> bool {
        self.options.transactional_batch
    }

    async fn execute_batch(&self, key: &BrookKey, ops: Vec<BatchOperation>) -> StoreResult<()> {
        if !self.options.transactional_batch {
            return Err(StoreError::new(
                StoreStatus::NotImplemented,
                "transactional batches are disabled",
            ));
        }
        let mut inner = self.enter(StoreOperation::ExecuteBatch)?;
        self.check_size(
            ops.iter()
                .map(|op| match op {
                    BatchOperation::CreateEvent(record) => record.approximate_size(),
                    _ => 16,
                })
                .sum(),
        )?;

        // Validate everything first so a failed batch leaves no trace.
        let partition = inner.partitions.entry(key.clone()).or_default();
        for op in &ops {
            if let BatchOperation::CreateEvent(record) = op {
                match partition.events.get(&record.position) {
                    Some(existing) if existing != record => {
                        return Err(StoreError::conflict(format!(
                            "event already exists at position {}",
                            record.position
                        )));
                    }
                    _ => {}
                }
            }
        }

        for op in ops {
            match op {
                BatchOperation::CreateEvent(record) => {
                    partition.events.insert(record.position, record);
                }
                BatchOperation::UpsertHead(head) => partition.head = Some(head),
                BatchOperation::DeletePendingHead => partition.pending = None,
            }
        }
        Self::respond(&mut inner, StoreOperation::ExecuteBatch)
    }

    async fn list_snapshots(&self, key: &BrookKey) -> StoreResult<Vec<SnapshotDescriptor>> {
        let inner = self.enter(StoreOperation::ListSnapshots)?;
        Ok(inner
            .partitions
            .get(key)
            .map(|p| p.snapshots.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn read_snapshot(
        &self,
        key: &BrookKey,
        fingerprint: &ReducerSetFingerprint,
        position: BrookPosition,
    ) -> StoreResult<Option<SnapshotRecord>> {
        let inner = self.enter(StoreOperation::ReadSnapshot)?;
        let descriptor = SnapshotDescriptor {
            fingerprint: *fingerprint,
            position,
        };
        Ok(inner
            .partitions
            .get(key)
            .and_then(|p| p.snapshots.get(&descriptor).cloned()))
    }

    async fn write_snapshot(&self, record: &SnapshotRecord) -> StoreResult<()> {
        let mut inner = self.enter(StoreOperation::WriteSnapshot)?;
        self.check_size(record.model.len())?;
        inner
            .partitions
            .entry(record.key.clone())
            .or_default()
            .snapshots
            .insert(record.descriptor(), record.clone());
        Ok(())
    }
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event Stream Appender - two-phase head commit
//!
//! # Protocol
//! ```text
//! lock(key)
//! ↓
//! 1. head = recover(key)              (absent ⇒ -1)
//! ↓
//! 2. expected ≠ head ⇒ ConcurrencyConflict
//! ↓
//! 3. create PendingHead{head, head+n}  (conditional)
//! ↓
//! 4a. batch: events + head + delete marker   (atomic store)
//! 4b. write events                            (durability point)
//!     ↓
//! 5.  write head, delete marker               (not cancellable)
//! ```
//! A crash anywhere after step 3 leaves a marker that recovery resolves on
//! the next access.
//!
//! # Invariants
//! - Positions of a batch are exactly `head+1 ..= head+n`
//! - The head never decreases
//! - At most one append per brook is in flight in this process

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use brook_kernel::{BrookEvent, BrookKey, BrookPosition, ExpectedVersion};

use crate::errors::{BrookError, BrookResult};
use crate::exclusive::KeyedWriterLocks;
use crate::notify::HeadNotifier;
use crate::recovery::RecoveryService;
use crate::retry::RetryPolicy;
use crate::storage::{BatchOperation, BrookStore, EventRecord, HeadRecord, PendingHeadRecord};

pub struct EventAppender<S> {
    store: Arc<S>,
    retry: RetryPolicy,
    recovery: Arc<RecoveryService<S>>,
    locks: KeyedWriterLocks,
    notifier: HeadNotifier,
    max_batch_operations: usize,
}

impl<S: BrookStore> EventAppender<S> {
    pub fn new(
        store: Arc<S>,
        retry: RetryPolicy,
        recovery: Arc<RecoveryService<S>>,
        locks: KeyedWriterLocks,
        notifier: HeadNotifier,
        max_batch_operations: usize,
    ) -> Self {
        Self {
            store,
            retry,
            recovery,
            locks,
            notifier,
            max_batch_operations,
        }
    }

    /// Append `events` in order and return the new head.
    pub async fn append(
        &self,
        key: &BrookKey,
        events: Vec<BrookEvent>,
        expected: ExpectedVersion,
        cancel: &CancellationToken,
    ) -> BrookResult<BrookPosition> {
        let started = Instant::now();
        let _guard = self.locks.lock(key).await;

        let (head, _) = self.recovery.recover_locked(key, cancel).await?;
        if !expected.matches(head) {
            return Err(BrookError::ConcurrencyConflict {
                key: key.clone(),
                expected,
                actual: head,
            });
        }

        if events.is_empty() {
            return Ok(head);
        }

        let count = events.len();
        let records = events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                let position = head.advance(i as u64 + 1)?;
                EventRecord::from_event(position, event)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let final_position = head.advance(count as u64)?;

        let pending = PendingHeadRecord {
            previous_head: head,
            final_position,
            created_at: Utc::now(),
        };
        self.retry
            .execute("create_pending_head", cancel, || {
                self.store.create_pending_head(key, &pending)
            })
            .await
            .map_err(|err| match err {
                BrookError::Store { source, .. } if source.is_conflict() => {
                    BrookError::ConcurrencyConflict {
                        key: key.clone(),
                        expected,
                        actual: head,
                    }
                }
                other => other,
            })?;

        let commit = HeadRecord {
            position: final_position,
        };

        if self.store.supports_transactional_batch() && count + 2 <= self.max_batch_operations {
            let ops: Vec<BatchOperation> = records
                .into_iter()
                .map(BatchOperation::CreateEvent)
                .chain([
                    BatchOperation::UpsertHead(commit),
                    BatchOperation::DeletePendingHead,
                ])
                .collect();
            self.retry
                .execute("execute_batch", cancel, || {
                    self.store.execute_batch(key, ops.clone())
                })
                .await?;
            tracing::debug!(key = %key, head = %final_position, count, "committed batch");
        } else {
            self.retry
                .execute("write_events", cancel, || self.store.write_events(key, &records))
                .await?;

            // Events are durable; finishing the commit must not be abandoned.
            let durable = CancellationToken::new();
            self.retry
                .execute("write_head", &durable, || self.store.write_head(key, commit))
                .await?;
            self.retry
                .execute("delete_pending_head", &durable, || {
                    self.store.delete_pending_head(key)
                })
                .await?;
            tracing::debug!(key = %key, head = %final_position, count, "committed two-phase");
        }

        self.notifier.publish(key, final_position);
        metrics::counter!("brook_events_appended_total", count as u64);
        metrics::histogram!("brook_append_duration_seconds", started.elapsed().as_secs_f64());

        Ok(final_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::storage::{InMemoryStore, InMemoryStoreOptions, StoreError, StoreOperation, StoreStatus};

    fn key() -> BrookKey {
        BrookKey::new("cart", "c1").unwrap()
    }

    fn event(n: u32) -> BrookEvent {
        BrookEvent::json(format!("evt-{}", n), "tests", "Added", &n)
            .unwrap()
            .stamped()
    }

    fn appender(store: &Arc<InMemoryStore>, max_batch: usize) -> EventAppender<InMemoryStore> {
        let locks = KeyedWriterLocks::new();
        let retry = RetryPolicy::new(2, std::time::Duration::from_millis(1), std::time::Duration::from_millis(2));
        let notifier = HeadNotifier::new();
        let recovery = Arc::new(RecoveryService::new(
            store.clone(),
            retry.clone(),
            locks.clone(),
            notifier.clone(),
            100,
        ));
        EventAppender::new(store.clone(), retry, recovery, locks, notifier, max_batch)
    }

    #[tokio::test]
    async fn test_batch_path_uses_single_request() {
        let store = Arc::new(InMemoryStore::new());
        let head = appender(&store, 100)
            .append(&key(), vec![event(1), event(2)], ExpectedVersion::EMPTY, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(head.value(), 1);
        assert_eq!(store.call_count(StoreOperation::ExecuteBatch), 1);
        assert_eq!(store.call_count(StoreOperation::WriteEvents), 0);
        assert!(store.read_pending_head(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_batch_takes_two_phase_path() {
        let store = Arc::new(InMemoryStore::new());
        let events: Vec<_> = (0..4).map(event).collect();
        let head = appender(&store, 5)
            .append(&key(), events, ExpectedVersion::Any, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(head.value(), 3);
        assert_eq!(store.call_count(StoreOperation::ExecuteBatch), 0);
        assert_eq!(store.call_count(StoreOperation::WriteEvents), 1);
        assert_eq!(store.read_head(&key()).await.unwrap().unwrap().position, head);
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = Arc::new(InMemoryStore::new());
        let appender = appender(&store, 100);
        let cancel = CancellationToken::new();
        appender
            .append(&key(), vec![event(1)], ExpectedVersion::EMPTY, &cancel)
            .await
            .unwrap();

        let err = appender
            .append(&key(), vec![event(2)], ExpectedVersion::EMPTY, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);
        assert_eq!(store.event_count(&key()), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_head_without_writes() {
        let store = Arc::new(InMemoryStore::new());
        let head = appender(&store, 100)
            .append(&key(), Vec::new(), ExpectedVersion::EMPTY, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(head, BrookPosition::NOT_SET);
        assert_eq!(store.call_count(StoreOperation::CreatePendingHead), 0);
    }

    #[tokio::test]
    async fn test_missing_time_fails_before_any_write() {
        let store = Arc::new(InMemoryStore::new());
        let unstamped = BrookEvent::json("evt-x", "tests", "Added", &1u32).unwrap();

        let err = appender(&store, 100)
            .append(&key(), vec![event(0), unstamped], ExpectedVersion::Any, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(store.call_count(StoreOperation::CreatePendingHead), 0);
    }

    #[tokio::test]
    async fn test_payload_too_large_is_not_retried() {
        let store = Arc::new(InMemoryStore::with_options(InMemoryStoreOptions {
            max_request_bytes: Some(8),
            ..Default::default()
        }));
        let err = appender(&store, 100)
            .append(&key(), vec![event(1)], ExpectedVersion::Any, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::PayloadTooLarge);
        assert_eq!(store.call_count(StoreOperation::ExecuteBatch), 1);
    }

    #[tokio::test]
    async fn test_commit_ignores_cancellation_after_durability() {
        let store = Arc::new(InMemoryStore::with_options(InMemoryStoreOptions {
            transactional_batch: false,
            ..Default::default()
        }));
        store.fail_next(
            StoreOperation::WriteHead,
            StoreError::new(StoreStatus::ServiceUnavailable, "busy"),
            1,
        );
        let appender = appender(&store, 100);
        let cancel = CancellationToken::new();

        // Cancel once the events are written; the head write still retries.
        let head = {
            let stream_key = key();
            let append = appender.append(&stream_key, vec![event(1)], ExpectedVersion::Any, &cancel);
            tokio::pin!(append);
            loop {
                tokio::select! {
                    result = &mut append => break result.unwrap(),
                    _ = tokio::task::yield_now() => {
                        if store.call_count(StoreOperation::WriteEvents) > 0 {
                            cancel.cancel();
                        }
                    }
                }
            }
        };

        assert_eq!(head.value(), 0);
        assert_eq!(store.read_head(&key()).await.unwrap().unwrap().position, head);
        assert!(store.read_pending_head(&key()).await.unwrap().is_none());
    }
}

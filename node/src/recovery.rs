// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Crash Recovery
//!
//! An append writes a pending marker before its events and deletes it after
//! the head moves. A marker found later means the append was interrupted:
//! - every event in `previous_head+1 ..= final_position` present: the append
//!   reached durability, so the commit is completed
//! - any event missing: the append never completed, so the partial events
//!   are deleted and the head is reset to `previous_head`
//!
//! A head record already at `final_position` counts as proof that every event
//! was durable. A completed head is published to in-process subscribers.
//!
//! # Invariants
//! - Resolution only depends on durable state, so it is idempotent
//! - Resolution runs under the brook's writer lock and never races an
//!   in-process append

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use brook_kernel::{BrookKey, BrookPosition};

use crate::errors::BrookResult;
use crate::exclusive::KeyedWriterLocks;
use crate::notify::HeadNotifier;
use crate::retry::RetryPolicy;
use crate::storage::{BrookStore, HeadRecord, PendingHeadRecord};

/// How an interrupted append was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Clean,
    Completed,
    RolledBack,
}

impl RecoveryOutcome {
    fn label(self) -> &'static str {
        match self {
            RecoveryOutcome::Clean => "clean",
            RecoveryOutcome::Completed => "completed",
            RecoveryOutcome::RolledBack => "rolled_back",
        }
    }
}

pub struct RecoveryService<S> {
    store: Arc<S>,
    retry: RetryPolicy,
    locks: KeyedWriterLocks,
    notifier: HeadNotifier,
    page_size: usize,
}

impl<S: BrookStore> RecoveryService<S> {
    pub fn new(
        store: Arc<S>,
        retry: RetryPolicy,
        locks: KeyedWriterLocks,
        notifier: HeadNotifier,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            retry,
            locks,
            notifier,
            page_size: page_size.max(1),
        }
    }

    /// Current committed head, resolving an interrupted append first.
    pub async fn get_or_recover_head(
        &self,
        key: &BrookKey,
        cancel: &CancellationToken,
    ) -> BrookResult<BrookPosition> {
        let (head, pending) = self.read_state(key, cancel).await?;
        if pending.is_none() {
            return Ok(head);
        }

        let _guard = self.locks.lock(key).await;
        self.recover_locked(key, cancel).await.map(|(head, _)| head)
    }

    /// Resolve with the writer lock already held by the caller.
    pub(crate) async fn recover_locked(
        &self,
        key: &BrookKey,
        cancel: &CancellationToken,
    ) -> BrookResult<(BrookPosition, RecoveryOutcome)> {
        let (head, pending) = self.read_state(key, cancel).await?;
        match pending {
            None => Ok((head, RecoveryOutcome::Clean)),
            Some(pending) => self.resolve(key, head, pending, cancel).await,
        }
    }

    async fn read_state(
        &self,
        key: &BrookKey,
        cancel: &CancellationToken,
    ) -> BrookResult<(BrookPosition, Option<PendingHeadRecord>)> {
        let head = self
            .retry
            .execute("read_head", cancel, || self.store.read_head(key))
            .await?
            .map(|h| h.position)
            .unwrap_or(BrookPosition::NOT_SET);
        let pending = self
            .retry
            .execute("read_pending_head", cancel, || self.store.read_pending_head(key))
            .await?;
        Ok((head, pending))
    }

    async fn resolve(
        &self,
        key: &BrookKey,
        head: BrookPosition,
        pending: PendingHeadRecord,
        cancel: &CancellationToken,
    ) -> BrookResult<(BrookPosition, RecoveryOutcome)> {
        let first = pending.previous_head.next()?;
        let last = pending.final_position;
        let expected = (last.value() - pending.previous_head.value()).max(0) as u64;

        // The head is only written once every event is durable, so a head at
        // the final position settles it even if the range query lags.
        let present = if head == last {
            expected
        } else {
            self.count_present(key, first, last, cancel).await?
        };

        let outcome = if present == expected {
            if head != last {
                self.write_head(key, last, cancel).await?;
            }
            self.retry
                .execute("delete_pending_head", cancel, || self.store.delete_pending_head(key))
                .await?;
            tracing::info!(
                key = %key,
                previous_head = %pending.previous_head,
                final_position = %last,
                "completed interrupted append"
            );
            self.notifier.publish(key, last);
            (last, RecoveryOutcome::Completed)
        } else {
            if head != pending.previous_head {
                tracing::warn!(
                    key = %key,
                    head = %head,
                    previous_head = %pending.previous_head,
                    "head record disagreed with pending marker, resetting"
                );
                self.write_head(key, pending.previous_head, cancel).await?;
            }
            let removed = if last < first {
                0
            } else {
                self.retry
                    .execute("delete_events", cancel, || self.store.delete_events(key, first, last))
                    .await?
            };
            self.retry
                .execute("delete_pending_head", cancel, || self.store.delete_pending_head(key))
                .await?;
            tracing::warn!(
                key = %key,
                previous_head = %pending.previous_head,
                final_position = %last,
                present,
                expected,
                removed,
                "rolled back interrupted append"
            );
            (pending.previous_head, RecoveryOutcome::RolledBack)
        };

        metrics::increment_counter!("brook_recovery_total", "outcome" => outcome.1.label());
        Ok(outcome)
    }

    async fn write_head(
        &self,
        key: &BrookKey,
        position: BrookPosition,
        cancel: &CancellationToken,
    ) -> BrookResult<()> {
        self.retry
            .execute("write_head", cancel, || {
                self.store.write_head(key, HeadRecord { position })
            })
            .await
    }

    async fn count_present(
        &self,
        key: &BrookKey,
        first: BrookPosition,
        last: BrookPosition,
        cancel: &CancellationToken,
    ) -> BrookResult<u64> {
        let mut present = 0u64;
        let mut from = first;
        while from <= last {
            let page = self
                .retry
                .execute("query_events", cancel, || {
                    self.store.query_events(key, from, last, self.page_size)
                })
                .await?;
            let Some(tail) = page.last() else {
                break;
            };
            present += page.len() as u64;
            from = tail.position.next()?;
        }
        Ok(present)
    }
}

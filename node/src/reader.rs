// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event Stream Reader
//!
//! Streams a range of a brook in ascending position order, one store page at
//! a time. The stream is lazy and restartable: every call starts over from
//! the range start.
//!
//! The store may lag behind writes made elsewhere. If a page comes back
//! empty or with a gap before the end of the range, the stream ends with
//! `EnumerationAborted` instead of silently truncating.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use brook_kernel::{BrookEvent, BrookPosition, BrookRangeKey};

use crate::errors::{BrookError, BrookResult};
use crate::retry::RetryPolicy;
use crate::storage::BrookStore;

pub type EventStream = BoxStream<'static, BrookResult<BrookEvent>>;

/// Result of a bounded-retry read.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub events: Vec<BrookEvent>,
    /// `false` when the store stayed behind the requested end after one retry.
    pub complete: bool,
}

pub struct EventReader<S> {
    store: Arc<S>,
    retry: RetryPolicy,
    page_size: usize,
}

impl<S> Clone for EventReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry: self.retry.clone(),
            page_size: self.page_size,
        }
    }
}

impl<S: BrookStore> EventReader<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy, page_size: usize) -> Self {
        Self {
            store,
            retry,
            page_size: page_size.max(1),
        }
    }

    pub fn read_events(&self, range: BrookRangeKey, cancel: CancellationToken) -> EventStream {
        let store = Arc::clone(&self.store);
        let retry = self.retry.clone();
        let page_size = self.page_size;

        let stream = async_stream::stream! {
            let key = range.key().clone();
            let end = range.end();
            let mut next = range.start();

            while next <= end {
                if cancel.is_cancelled() {
                    yield Err(BrookError::Cancelled);
                    return;
                }

                let page = match retry
                    .execute("query_events", &cancel, || store.query_events(&key, next, end, page_size))
                    .await
                {
                    Ok(page) => page,
                    Err(err) => {
                        yield Err(err);
                        return;
                    }
                };

                if page.is_empty() {
                    yield Err(aborted(&range, next));
                    return;
                }

                for record in page {
                    if record.position != next {
                        yield Err(aborted(&range, next));
                        return;
                    }
                    next = match next.next() {
                        Ok(position) => position,
                        Err(err) => {
                            yield Err(BrookError::from(err));
                            return;
                        }
                    };
                    yield Ok(record.into_event());
                }
            }
        };

        stream.boxed()
    }

    /// Read a whole range, retrying a consistency-lag abort once before
    /// settling for a partial result.
    pub async fn read_all(
        &self,
        range: BrookRangeKey,
        cancel: &CancellationToken,
    ) -> BrookResult<ReadOutcome> {
        let mut events = Vec::with_capacity(range.len().min(self.page_size as u64 * 4) as usize);
        let mut remaining = range.clone();
        let mut retried = false;

        loop {
            let mut stream = self.read_events(remaining.clone(), cancel.clone());
            let mut aborted_at = None;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => events.push(event),
                    Err(BrookError::EnumerationAborted { reached, .. }) => {
                        aborted_at = Some(reached);
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }

            let Some(reached) = aborted_at else {
                return Ok(ReadOutcome {
                    events,
                    complete: true,
                });
            };

            if retried {
                tracing::warn!(
                    range = %range,
                    reached = %reached,
                    received = events.len(),
                    "read still behind after retry, returning partial result"
                );
                return Ok(ReadOutcome {
                    events,
                    complete: false,
                });
            }

            retried = true;
            tracing::debug!(range = %range, reached = %reached, "read aborted, retrying once");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BrookError::Cancelled),
                _ = tokio::time::sleep(self.retry.backoff(0, None)) => {}
            }
            remaining = BrookRangeKey::new(range.key().clone(), reached.next()?, range.end())?;
        }
    }
}

fn aborted(range: &BrookRangeKey, next: BrookPosition) -> BrookError {
    metrics::increment_counter!("brook_read_aborted_total");
    BrookError::EnumerationAborted {
        key: range.key().clone(),
        requested: range.end(),
        reached: next.previous(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::storage::{EventRecord, InMemoryStore, StoreOperation};
    use brook_kernel::BrookKey;
    use chrono::Utc;
    use futures::TryStreamExt;

    fn key() -> BrookKey {
        BrookKey::new("feed", "f1").unwrap()
    }

    fn pos(v: i64) -> BrookPosition {
        BrookPosition::new(v).unwrap()
    }

    async fn seeded(n: i64) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let records: Vec<_> = (0..n)
            .map(|p| EventRecord {
                position: pos(p),
                id: format!("e{}", p),
                source: "tests".into(),
                event_type: "Added".into(),
                data_content_type: "application/json".into(),
                data: p.to_string().into_bytes(),
                time: Utc::now(),
            })
            .collect();
        store.write_events(&key(), &records).await.unwrap();
        store
    }

    fn reader(store: &Arc<InMemoryStore>, page_size: usize) -> EventReader<InMemoryStore> {
        let retry = RetryPolicy::new(1, std::time::Duration::from_millis(1), std::time::Duration::from_millis(1));
        EventReader::new(store.clone(), retry, page_size)
    }

    #[tokio::test]
    async fn test_reads_across_pages_in_order() {
        let store = seeded(7).await;
        let range = BrookRangeKey::new(key(), pos(1), pos(6)).unwrap();

        let events: Vec<_> = reader(&store, 2)
            .read_events(range, CancellationToken::new())
            .try_collect()
            .await
            .unwrap();

        let ids: Vec<_> = events.iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["e1", "e2", "e3", "e4", "e5", "e6"]);
        assert_eq!(store.call_count(StoreOperation::QueryEvents), 3);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let store = seeded(4).await;
        let range = BrookRangeKey::new(key(), pos(0), pos(3)).unwrap();

        let mut stream = reader(&store, 2).read_events(range, CancellationToken::new());
        assert_eq!(store.call_count(StoreOperation::QueryEvents), 0);

        stream.next().await.unwrap().unwrap();
        assert_eq!(store.call_count(StoreOperation::QueryEvents), 1);
    }

    #[tokio::test]
    async fn test_lagging_store_aborts_enumeration() {
        let store = seeded(5).await;
        store.set_visible_through(&key(), Some(pos(2)));
        let range = BrookRangeKey::new(key(), pos(0), pos(4)).unwrap();

        let results: Vec<_> = reader(&store, 10)
            .read_events(range, CancellationToken::new())
            .collect()
            .await;

        assert_eq!(results.len(), 4);
        match results.last().unwrap() {
            Err(BrookError::EnumerationAborted { requested, reached, .. }) => {
                assert_eq!(*requested, pos(4));
                assert_eq!(*reached, pos(2));
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_all_degrades_to_partial() {
        let store = seeded(5).await;
        store.set_visible_through(&key(), Some(pos(2)));
        let range = BrookRangeKey::new(key(), pos(0), pos(4)).unwrap();

        let outcome = reader(&store, 10).read_all(range, &CancellationToken::new()).await.unwrap();
        assert!(!outcome.complete);
        assert_eq!(outcome.events.len(), 3);
        // two pages on the first pass, one on the single retry
        assert_eq!(store.call_count(StoreOperation::QueryEvents), 3);
    }

    #[tokio::test]
    async fn test_read_all_complete_when_visible() {
        let store = seeded(5).await;
        let range = BrookRangeKey::new(key(), pos(0), pos(4)).unwrap();

        let outcome = reader(&store, 2).read_all(range, &CancellationToken::new()).await.unwrap();
        assert!(outcome.complete);
        assert_eq!(outcome.events.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_range_reads_nothing() {
        let store = seeded(3).await;
        let range = BrookRangeKey::new(key(), pos(2), pos(1)).unwrap();

        let events: Vec<_> = reader(&store, 10)
            .read_events(range, CancellationToken::new())
            .try_collect()
            .await
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(store.call_count(StoreOperation::QueryEvents), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let store = seeded(3).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let range = BrookRangeKey::new(key(), pos(0), pos(2)).unwrap();

        let first = reader(&store, 10).read_events(range, cancel).next().await.unwrap();
        assert_eq!(first.unwrap_err().kind(), ErrorKind::Cancelled);
    }
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
mod common;

use std::sync::Arc;

use chrono::Utc;

use brook_kernel::{BrookPosition, BrookRangeKey, ExpectedVersion};
use brook_node::storage::{
    EventRecord, HeadRecord, InMemoryStoreOptions, PendingHeadRecord, StoreError, StoreOperation,
    StoreStatus,
};
use brook_node::{BrookStore, ErrorKind, InMemoryStore};

use common::*;

fn pos(v: i64) -> BrookPosition {
    BrookPosition::new(v).unwrap()
}

fn two_phase_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::with_options(InMemoryStoreOptions {
        transactional_batch: false,
        ..Default::default()
    }))
}

/// Fails the head write once, after the events are already durable.
async fn crash_before_head(store: &Arc<InMemoryStore>) -> brook_kernel::BrookKey {
    let engine = engine(Arc::clone(store));
    let key = key("crash");
    engine
        .append(&key, vec![incremented(1)], ExpectedVersion::EMPTY)
        .await
        .unwrap();

    store.fail_next(
        StoreOperation::WriteHead,
        StoreError::new(StoreStatus::Other(400), "simulated crash"),
        1,
    );
    let err = engine
        .append(&key, vec![incremented(2), incremented(3)], ExpectedVersion::Exact(pos(0)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
    key
}

#[tokio::test]
async fn test_interrupted_commit_is_completed_on_next_read() {
    let store = two_phase_store();
    let key = crash_before_head(&store).await;

    // A fresh engine has no memory of the failed append.
    let engine = engine(Arc::clone(&store));
    assert_eq!(engine.get_head(&key).await.unwrap(), pos(2));
    assert!(store.read_pending_head(&key).await.unwrap().is_none());
    assert_eq!(store.read_head(&key).await.unwrap().unwrap().position, pos(2));

    let model = engine
        .snapshots(counter_reducers())
        .get_model(&key, None, &engine.shutdown_token())
        .await
        .unwrap();
    assert_eq!(model.total, 6);
}

#[tokio::test]
async fn test_next_append_heals_interrupted_commit() {
    let store = two_phase_store();
    let key = crash_before_head(&store).await;
    let engine = engine(Arc::clone(&store));

    // The caller only knew head 0; the completed commit moved it to 2.
    let err = engine
        .append(&key, vec![incremented(4)], ExpectedVersion::Exact(pos(0)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrencyConflict);

    let head = engine
        .append(&key, vec![incremented(4)], ExpectedVersion::Exact(pos(2)))
        .await
        .unwrap();
    assert_eq!(head, pos(3));
    assert_eq!(store.event_count(&key), 4);
}

#[tokio::test]
async fn test_partial_events_are_rolled_back() {
    let store = Arc::new(InMemoryStore::new());
    let engine = engine(Arc::clone(&store));
    let key = key("partial");
    engine
        .append(&key, vec![incremented(1)], ExpectedVersion::EMPTY)
        .await
        .unwrap();

    // Marker for positions 1..=3 but only position 1 made it to the store.
    store
        .create_pending_head(
            &key,
            &PendingHeadRecord {
                previous_head: pos(0),
                final_position: pos(3),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    let orphan = EventRecord::from_event(pos(1), &incremented(99)).unwrap();
    store.write_events(&key, &[orphan]).await.unwrap();
    assert_eq!(store.event_count(&key), 2);

    assert_eq!(engine.get_head(&key).await.unwrap(), pos(0));
    assert_eq!(store.event_count(&key), 1);
    assert!(store.read_pending_head(&key).await.unwrap().is_none());

    let outcome = engine
        .read_all(BrookRangeKey::through(key.clone(), pos(0)))
        .await
        .unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.events.len(), 1);
    assert_eq!(outcome.events[0].id(), "inc-1");
}

#[tokio::test]
async fn test_recovery_is_idempotent() {
    let store = two_phase_store();
    let key = crash_before_head(&store).await;
    let engine = engine(Arc::clone(&store));

    assert_eq!(engine.get_head(&key).await.unwrap(), pos(2));
    store.reset_call_counts();
    assert_eq!(engine.get_head(&key).await.unwrap(), pos(2));

    // A clean brook costs two point reads and no writes.
    assert_eq!(store.call_count(StoreOperation::ReadHead), 1);
    assert_eq!(store.call_count(StoreOperation::ReadPendingHead), 1);
    assert_eq!(store.call_count(StoreOperation::WriteHead), 0);
    assert_eq!(store.call_count(StoreOperation::DeleteEvents), 0);
}

#[tokio::test]
async fn test_marker_without_events_on_empty_brook() {
    let store = Arc::new(InMemoryStore::new());
    let key = key("ghost");
    store
        .create_pending_head(
            &key,
            &PendingHeadRecord {
                previous_head: BrookPosition::NOT_SET,
                final_position: pos(1),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    let engine = engine(Arc::clone(&store));
    assert_eq!(engine.get_head(&key).await.unwrap(), BrookPosition::NOT_SET);
    let head = engine
        .append(&key, vec![incremented(5)], ExpectedVersion::EMPTY)
        .await
        .unwrap();
    assert_eq!(head, pos(0));
}

/// Events 0..=4 durable and the head already at 4, but the marker for 2..=4
/// was never deleted.
async fn crash_before_marker_delete(store: &Arc<InMemoryStore>, key: &brook_kernel::BrookKey) {
    let records: Vec<_> = (0..5)
        .map(|p| EventRecord::from_event(pos(p), &incremented(p)).unwrap())
        .collect();
    store.write_events(key, &records).await.unwrap();
    store
        .create_pending_head(
            key,
            &PendingHeadRecord {
                previous_head: pos(1),
                final_position: pos(4),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    store.write_head(key, HeadRecord { position: pos(4) }).await.unwrap();
}

#[tokio::test]
async fn test_lagging_store_does_not_undo_written_head() {
    let store = Arc::new(InMemoryStore::new());
    let key = key("lagging");
    crash_before_marker_delete(&store, &key).await;
    store.set_visible_through(&key, Some(pos(2)));

    let engine = engine(Arc::clone(&store));
    let first = engine.get_head(&key).await.unwrap();
    let second = engine.get_head(&key).await.unwrap();

    assert_eq!(first, pos(4));
    assert_eq!(second, first);
    assert_eq!(store.event_count(&key), 5);
    assert_eq!(store.read_head(&key).await.unwrap().unwrap().position, pos(4));
    assert!(store.read_pending_head(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rollback_leaves_head_consistent_with_events() {
    let store = Arc::new(InMemoryStore::new());
    let key = key("torn");
    crash_before_marker_delete(&store, &key).await;
    // Head says 3 while position 3 never made it.
    store.write_head(&key, HeadRecord { position: pos(3) }).await.unwrap();
    store.delete_events(&key, pos(3), pos(3)).await.unwrap();

    let engine = engine(Arc::clone(&store));
    assert_eq!(engine.get_head(&key).await.unwrap(), pos(1));
    assert_eq!(engine.get_head(&key).await.unwrap(), pos(1));
    assert_eq!(store.read_head(&key).await.unwrap().unwrap().position, pos(1));
    assert_eq!(store.event_count(&key), 2);

    let outcome = engine
        .read_all(BrookRangeKey::through(key.clone(), pos(1)))
        .await
        .unwrap();
    assert!(outcome.complete);
    assert_eq!(outcome.events.len(), 2);
}

#[tokio::test]
async fn test_recovered_head_reaches_subscribers() {
    let store = Arc::new(InMemoryStore::new());
    let engine = engine(Arc::clone(&store));
    let key = key("observed");
    engine
        .append(&key, vec![incremented(1)], ExpectedVersion::EMPTY)
        .await
        .unwrap();

    let projections = engine.projections(counter_reducers());
    let cancel = engine.shutdown_token();
    let mut subscription = projections.subscribe(&key, &cancel).await.unwrap();
    assert_eq!(subscription.current().position, pos(0));

    // Another writer got its events in but died before moving the head.
    store
        .create_pending_head(
            &key,
            &PendingHeadRecord {
                previous_head: pos(0),
                final_position: pos(2),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    let records: Vec<_> = (1..3)
        .map(|p| EventRecord::from_event(pos(p), &incremented(10)).unwrap())
        .collect();
    store.write_events(&key, &records).await.unwrap();

    assert_eq!(engine.get_head(&key).await.unwrap(), pos(2));
    let next = tokio::time::timeout(std::time::Duration::from_secs(5), subscription.changed(&cancel))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.position, pos(2));
    assert_eq!(next.model.total, 21);
}

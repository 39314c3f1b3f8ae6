// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Versioned read-only projections.
//!
//! Consumers get `Arc<M>` snapshots tagged with the position they reflect
//! and can wait for the next committed head. Delivery is in-process only.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use brook_kernel::{BrookKey, BrookPosition};

use crate::errors::{BrookError, BrookResult};
use crate::notify::HeadNotifier;
use crate::snapshot::{SnapshotEngine, Versioned};
use crate::storage::BrookStore;

pub struct ProjectionService<S, M> {
    snapshots: Arc<SnapshotEngine<S, M>>,
    notifier: HeadNotifier,
}

impl<S, M> Clone for ProjectionService<S, M> {
    fn clone(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
            notifier: self.notifier.clone(),
        }
    }
}

impl<S, M> ProjectionService<S, M>
where
    S: BrookStore,
    M: Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(snapshots: Arc<SnapshotEngine<S, M>>, notifier: HeadNotifier) -> Self {
        Self { snapshots, notifier }
    }

    pub fn snapshots(&self) -> &SnapshotEngine<S, M> {
        &self.snapshots
    }

    /// Model at `version`, or the latest committed one.
    pub async fn get(
        &self,
        key: &BrookKey,
        version: Option<BrookPosition>,
        cancel: &CancellationToken,
    ) -> BrookResult<Versioned<M>> {
        self.snapshots.get_versioned(key, version, cancel).await
    }

    /// Current model plus a handle that yields each newer committed version.
    pub async fn subscribe(
        &self,
        key: &BrookKey,
        cancel: &CancellationToken,
    ) -> BrookResult<ProjectionSubscription<S, M>> {
        // Subscribe before reading so an append in between is not missed.
        let heads = self.notifier.subscribe(key, BrookPosition::NOT_SET);
        let current = self.snapshots.get_versioned(key, None, cancel).await?;
        Ok(ProjectionSubscription {
            key: key.clone(),
            snapshots: Arc::clone(&self.snapshots),
            heads,
            current,
        })
    }
}

pub struct ProjectionSubscription<S, M> {
    key: BrookKey,
    snapshots: Arc<SnapshotEngine<S, M>>,
    heads: watch::Receiver<BrookPosition>,
    current: Versioned<M>,
}

impl<S, M> ProjectionSubscription<S, M>
where
    S: BrookStore,
    M: Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn key(&self) -> &BrookKey {
        &self.key
    }

    pub fn current(&self) -> &Versioned<M> {
        &self.current
    }

    /// Wait for a head newer than the current version and return its model.
    pub async fn changed(&mut self, cancel: &CancellationToken) -> BrookResult<Versioned<M>> {
        loop {
            let head = *self.heads.borrow_and_update();
            if head.is_newer_than(self.current.position) {
                let next = self.snapshots.get_versioned(&self.key, Some(head), cancel).await?;
                self.current = next.clone();
                return Ok(next);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BrookError::Cancelled),
                changed = self.heads.changed() => {
                    if changed.is_err() {
                        // Notifier gone: nothing newer will ever arrive.
                        return Err(BrookError::Cancelled);
                    }
                }
            }
        }
    }
}

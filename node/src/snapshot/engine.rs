// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Snapshot Rebuild Engine
//!
//! # Decision procedure
//! ```text
//! target = at ?? recovered head          (target > head ⇒ PositionUnavailable)
//! ↓
//! 1. cache entry, same fingerprint, position == target      → Cache
//! ↓
//! 2. newest matching base ≤ target (cache or persisted)
//!      base == target                                       → Stored
//!      base <  target, replay base+1 ..= target             → Delta
//! ↓
//! 3. replay 0 ..= target from M::default()                  → Full
//! ```
//! A snapshot from another reducer set is never used. When one would have
//! been the best base, the miss is counted as a fingerprint mismatch.
//! Rebuilt models are cached and persisted best-effort.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use brook_kernel::{BrookKey, BrookPosition, BrookRangeKey, ReducerSetFingerprint, RootReducer};

use crate::config::SnapshotConfig;
use crate::errors::{BrookError, BrookResult};
use crate::reader::EventReader;
use crate::recovery::RecoveryService;
use crate::replay::fold_stream;
use crate::retry::RetryPolicy;
use crate::storage::{BrookStore, SnapshotDescriptor, SnapshotRecord};

use super::cache::{CachedModel, ModelCache};
use super::{ModelSource, Versioned};

struct Base<M> {
    position: BrookPosition,
    model: Arc<M>,
}

pub struct SnapshotEngine<S, M> {
    store: Arc<S>,
    retry: RetryPolicy,
    recovery: Arc<RecoveryService<S>>,
    reader: EventReader<S>,
    root: Arc<RootReducer<M>>,
    cache: ModelCache<M>,
    persist: bool,
}

impl<S, M> SnapshotEngine<S, M>
where
    S: BrookStore,
    M: Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        store: Arc<S>,
        retry: RetryPolicy,
        recovery: Arc<RecoveryService<S>>,
        reader: EventReader<S>,
        root: Arc<RootReducer<M>>,
        config: &SnapshotConfig,
    ) -> Self {
        Self {
            store,
            retry,
            recovery,
            reader,
            root,
            cache: ModelCache::new(config.cache_capacity),
            persist: config.persist,
        }
    }

    pub fn fingerprint(&self) -> ReducerSetFingerprint {
        self.root.fingerprint()
    }

    pub fn root(&self) -> &RootReducer<M> {
        &self.root
    }

    pub fn cache(&self) -> &ModelCache<M> {
        &self.cache
    }

    /// Model at `at`, or at the current head when `at` is `None`.
    pub async fn get_model(
        &self,
        key: &BrookKey,
        at: Option<BrookPosition>,
        cancel: &CancellationToken,
    ) -> BrookResult<Arc<M>> {
        self.get_versioned(key, at, cancel).await.map(|v| v.model)
    }

    pub async fn get_versioned(
        &self,
        key: &BrookKey,
        at: Option<BrookPosition>,
        cancel: &CancellationToken,
    ) -> BrookResult<Versioned<M>> {
        let fingerprint = self.root.fingerprint();
        let head = self.recovery.get_or_recover_head(key, cancel).await?;
        let target = match at {
            Some(requested) if requested.is_newer_than(head) => {
                return Err(BrookError::PositionUnavailable {
                    key: key.clone(),
                    requested,
                    head,
                })
            }
            Some(requested) => requested,
            None => head,
        };

        if !target.is_set() {
            return Ok(Versioned {
                model: Arc::new(M::default()),
                position: BrookPosition::NOT_SET,
                fingerprint,
                source: ModelSource::Full,
            });
        }

        let cached = self.cache.get(key);
        if let Some(entry) = &cached {
            if entry.fingerprint == fingerprint && entry.position == target {
                metrics::increment_counter!("brook_snapshot_cache_hits_total");
                return Ok(Versioned {
                    model: Arc::clone(&entry.model),
                    position: target,
                    fingerprint,
                    source: ModelSource::Cache,
                });
            }
        }
        metrics::increment_counter!("brook_snapshot_cache_misses_total");

        let stored = self.list_eligible(key, target, cancel).await?;
        let stored_best = stored
            .iter()
            .filter(|d| d.fingerprint == fingerprint)
            .map(|d| d.position)
            .max();
        let cached_best = cached
            .as_ref()
            .filter(|e| e.fingerprint == fingerprint && e.position <= target)
            .map(|e| e.position);

        let newest_match = stored_best.max(cached_best);
        let newest_foreign = stored
            .iter()
            .filter(|d| d.fingerprint != fingerprint)
            .map(|d| d.position)
            .chain(
                cached
                    .as_ref()
                    .filter(|e| e.fingerprint != fingerprint && e.position <= target)
                    .map(|e| e.position),
            )
            .max();
        if let Some(foreign) = newest_foreign {
            if newest_match.map_or(true, |matched| foreign.is_newer_than(matched)) {
                metrics::increment_counter!("brook_snapshot_fingerprint_mismatch_total");
                tracing::info!(
                    key = %key,
                    position = %foreign,
                    fingerprint = %fingerprint.short(),
                    "ignoring snapshot built by a different reducer set"
                );
            }
        }

        let cache_base = cached
            .filter(|e| Some(e.position) == cached_best)
            .map(|e| Base {
                position: e.position,
                model: e.model,
            });
        let mut base = None;
        if stored_best > cached_best {
            if let Some(position) = stored_best {
                base = self.load_stored(key, &fingerprint, position, cancel).await?;
            }
        }
        if base.is_none() {
            base = cache_base;
        }

        if let Some(found) = &base {
            metrics::increment_counter!("brook_snapshot_base_used_total");
            if found.position == target {
                self.remember(key, fingerprint, target, &found.model);
                return Ok(Versioned {
                    model: Arc::clone(&found.model),
                    position: target,
                    fingerprint,
                    source: ModelSource::Stored,
                });
            }
        }

        let (seed, from, source) = match base {
            Some(found) => (found.model, found.position.next()?, ModelSource::Delta),
            None => (Arc::new(M::default()), BrookPosition::ZERO, ModelSource::Full),
        };

        let started = Instant::now();
        let range = BrookRangeKey::new(key.clone(), from, target)?;
        let model = self.replay(range, seed, cancel).await?;
        metrics::histogram!("brook_snapshot_rebuild_duration_seconds", started.elapsed().as_secs_f64());
        metrics::histogram!(
            "brook_snapshot_rebuild_events",
            (target.value() - from.value() + 1) as f64
        );
        tracing::debug!(
            key = %key,
            from = %from,
            target = %target,
            source = ?source,
            "rebuilt model"
        );

        self.remember(key, fingerprint, target, &model);
        if self.persist {
            self.persist_snapshot(key, fingerprint, target, &model, cancel).await;
        }

        Ok(Versioned {
            model,
            position: target,
            fingerprint,
            source,
        })
    }

    async fn list_eligible(
        &self,
        key: &BrookKey,
        target: BrookPosition,
        cancel: &CancellationToken,
    ) -> BrookResult<Vec<SnapshotDescriptor>> {
        match self
            .retry
            .execute("list_snapshots", cancel, || self.store.list_snapshots(key))
            .await
        {
            Ok(all) => Ok(all.into_iter().filter(|d| d.position <= target).collect()),
            Err(BrookError::Cancelled) => Err(BrookError::Cancelled),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "could not list snapshots, rebuilding without them");
                Ok(Vec::new())
            }
        }
    }

    async fn load_stored(
        &self,
        key: &BrookKey,
        fingerprint: &ReducerSetFingerprint,
        position: BrookPosition,
        cancel: &CancellationToken,
    ) -> BrookResult<Option<Base<M>>> {
        let record = match self
            .retry
            .execute("read_snapshot", cancel, || {
                self.store.read_snapshot(key, fingerprint, position)
            })
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(None),
            Err(BrookError::Cancelled) => return Err(BrookError::Cancelled),
            Err(err) => {
                tracing::warn!(key = %key, position = %position, error = %err, "could not read snapshot");
                return Ok(None);
            }
        };

        match bincode::serde::decode_from_slice::<M, _>(&record.model, bincode::config::standard()) {
            Ok((model, _)) => Ok(Some(Base {
                position,
                model: Arc::new(model),
            })),
            Err(e) => {
                tracing::warn!(key = %key, position = %position, error = %e, "undecodable snapshot ignored");
                Ok(None)
            }
        }
    }

    async fn replay(
        &self,
        range: BrookRangeKey,
        seed: Arc<M>,
        cancel: &CancellationToken,
    ) -> BrookResult<Arc<M>> {
        let mut retried = false;
        loop {
            let events = self.reader.read_events(range.clone(), cancel.clone());
            match fold_stream(&self.root, Arc::clone(&seed), events, cancel).await {
                Ok(folded) => return Ok(folded.model),
                Err(BrookError::EnumerationAborted { reached, .. }) if !retried => {
                    tracing::warn!(range = %range, reached = %reached, "replay aborted, retrying once");
                    retried = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn remember(
        &self,
        key: &BrookKey,
        fingerprint: ReducerSetFingerprint,
        position: BrookPosition,
        model: &Arc<M>,
    ) {
        self.cache.offer(
            key,
            CachedModel {
                fingerprint,
                position,
                model: Arc::clone(model),
            },
        );
    }

    async fn persist_snapshot(
        &self,
        key: &BrookKey,
        fingerprint: ReducerSetFingerprint,
        position: BrookPosition,
        model: &M,
        cancel: &CancellationToken,
    ) {
        let bytes = match bincode::serde::encode_to_vec(model, bincode::config::standard()) {
            Ok(bytes) => bytes,
            Err(e) => {
                metrics::increment_counter!("brook_snapshot_persist_failures_total");
                tracing::warn!(key = %key, error = %e, "could not encode snapshot");
                return;
            }
        };
        let record = SnapshotRecord {
            key: key.clone(),
            fingerprint,
            position,
            model: bytes,
            created_at: Utc::now(),
        };
        if let Err(err) = self
            .retry
            .execute("write_snapshot", cancel, || self.store.write_snapshot(&record))
            .await
        {
            metrics::increment_counter!("brook_snapshot_persist_failures_total");
            tracing::warn!(key = %key, position = %position, error = %err, "snapshot not persisted");
        }
    }
}

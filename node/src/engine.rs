// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Engine facade.
//!
//! Wires one store to the appender, reader, recovery service and head
//! notifier, and hands out snapshot engines and projections per model type.
//! Every operation runs under a child of the engine's shutdown token.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use brook_kernel::{BrookEvent, BrookKey, BrookPosition, BrookRangeKey, ExpectedVersion, RootReducer};

use crate::appender::EventAppender;
use crate::config::{ConfigError, EngineConfig};
use crate::errors::BrookResult;
use crate::exclusive::KeyedWriterLocks;
use crate::notify::HeadNotifier;
use crate::projection::ProjectionService;
use crate::reader::{EventReader, EventStream, ReadOutcome};
use crate::recovery::RecoveryService;
use crate::retry::RetryPolicy;
use crate::snapshot::SnapshotEngine;
use crate::storage::BrookStore;

pub struct BrookEngine<S> {
    config: EngineConfig,
    store: Arc<S>,
    retry: RetryPolicy,
    recovery: Arc<RecoveryService<S>>,
    appender: EventAppender<S>,
    reader: EventReader<S>,
    notifier: HeadNotifier,
    shutdown: CancellationToken,
}

impl<S: BrookStore> BrookEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let retry = RetryPolicy::from_config(&config.retry);
        let locks = KeyedWriterLocks::new();
        let notifier = HeadNotifier::new();
        let recovery = Arc::new(RecoveryService::new(
            Arc::clone(&store),
            retry.clone(),
            locks.clone(),
            notifier.clone(),
            config.reader.page_size,
        ));
        let appender = EventAppender::new(
            Arc::clone(&store),
            retry.clone(),
            Arc::clone(&recovery),
            locks,
            notifier.clone(),
            config.appender.max_batch_operations,
        );
        let reader = EventReader::new(Arc::clone(&store), retry.clone(), config.reader.page_size);

        tracing::debug!(?config, "brook engine ready");

        Ok(Self {
            config,
            store,
            retry,
            recovery,
            appender,
            reader,
            notifier,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, EngineConfig::default())
            .unwrap_or_else(|_| unreachable!("default config is valid"))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Token cancelled by `shutdown`; derive per-call tokens from it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    /// Cancel in-flight retries, reads and replays.
    pub fn shutdown(&self) {
        tracing::info!("brook engine shutting down");
        self.shutdown.cancel();
    }

    pub async fn append(
        &self,
        key: &BrookKey,
        events: Vec<BrookEvent>,
        expected: ExpectedVersion,
    ) -> BrookResult<BrookPosition> {
        let cancel = self.shutdown.child_token();
        self.appender.append(key, events, expected, &cancel).await
    }

    pub fn read_events(&self, range: BrookRangeKey) -> EventStream {
        self.reader.read_events(range, self.shutdown.child_token())
    }

    pub async fn read_all(&self, range: BrookRangeKey) -> BrookResult<ReadOutcome> {
        let cancel = self.shutdown.child_token();
        self.reader.read_all(range, &cancel).await
    }

    /// Committed head, resolving any interrupted append first.
    pub async fn get_head(&self, key: &BrookKey) -> BrookResult<BrookPosition> {
        let cancel = self.shutdown.child_token();
        self.recovery.get_or_recover_head(key, &cancel).await
    }

    /// Snapshot engine for one model type, sharing this engine's store.
    pub fn snapshots<M>(&self, root: RootReducer<M>) -> SnapshotEngine<S, M>
    where
        M: Default + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        SnapshotEngine::new(
            Arc::clone(&self.store),
            self.retry.clone(),
            Arc::clone(&self.recovery),
            self.reader.clone(),
            Arc::new(root),
            &self.config.snapshots,
        )
    }

    pub fn projections<M>(&self, root: RootReducer<M>) -> ProjectionService<S, M>
    where
        M: Default + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        ProjectionService::new(Arc::new(self.snapshots(root)), self.notifier.clone())
    }
}

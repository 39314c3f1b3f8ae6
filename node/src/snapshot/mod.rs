// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Snapshot cache and rebuild.
//!
//! Snapshots are derived data: a model serialized at a position, tagged with
//! the fingerprint of the reducer set that built it. They are only ever used
//! when that fingerprint matches the current reducer set, and they can always
//! be rebuilt from the event log.

pub mod cache;
pub mod engine;

use std::sync::Arc;

use brook_kernel::{BrookPosition, ReducerSetFingerprint};

pub use cache::{CachedModel, ModelCache};
pub use engine::SnapshotEngine;

/// Which path produced a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    /// In-memory cache at exactly the requested position.
    Cache,
    /// Persisted snapshot at exactly the requested position.
    Stored,
    /// Earlier snapshot plus replay of the events after it.
    Delta,
    /// Replay from the default model.
    Full,
}

/// A read-only model at a known position.
#[derive(Debug)]
pub struct Versioned<M> {
    pub model: Arc<M>,
    pub position: BrookPosition,
    pub fingerprint: ReducerSetFingerprint,
    pub source: ModelSource,
}

impl<M> Clone for Versioned<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            position: self.position,
            fingerprint: self.fingerprint,
            source: self.source,
        }
    }
}

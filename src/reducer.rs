// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Reducers fold events into materialized models.
//!
//! # Contract
//! - `reduce` is pure: same model + same event => same result
//! - Models are shared as `Arc<M>`. A reducer must hand back a NEW instance;
//!   returning the input `Arc` is how in-place mutation shows up, and it is
//!   rejected with `ReducerInvariantViolation`
//! - Dispatch is by the event's `event_type`; the payload is decoded into
//!   the reducer's `Event` type before the fold
//!
//! # Unhandled events
//! Events with no registered reducer follow the `UnhandledEventPolicy` set on
//! the builder. `Skip` leaves the model untouched, `Reject` fails the fold.

use core::borrow::Borrow;
use core::fmt;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::event::BrookEvent;
use crate::fingerprint::ReducerSetFingerprint;

/// Folds one event type into a model.
pub trait Reducer<M>: Send + Sync + 'static {
    /// Payload type decoded from the event data.
    type Event: DeserializeOwned;

    /// Event type this reducer handles.
    fn event_type(&self) -> &str;

    /// Bump when the fold logic changes; it feeds the reducer-set fingerprint.
    fn version(&self) -> u32 {
        1
    }

    /// Stable reducer name used in fingerprints and errors.
    fn name(&self) -> &str {
        self.event_type()
    }

    fn reduce(&self, model: Arc<M>, event: Self::Event) -> Arc<M>;
}

/// Identity of a registered reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReducerDescriptor {
    pub event_type: String,
    pub name: String,
    pub version: u32,
}

/// What to do with events no reducer is registered for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnhandledEventPolicy {
    /// Leave the model unchanged.
    #[default]
    Skip,
    /// Fail the fold with `UnhandledEvent`.
    Reject,
}

trait ErasedReducer<M>: Send + Sync {
    fn descriptor(&self) -> ReducerDescriptor;
    fn apply(&self, model: Arc<M>, event: &BrookEvent) -> KernelResult<Arc<M>>;
}

struct Registered<R>(R);

impl<M, R> ErasedReducer<M> for Registered<R>
where
    M: Send + Sync + 'static,
    R: Reducer<M>,
{
    fn descriptor(&self) -> ReducerDescriptor {
        ReducerDescriptor {
            event_type: self.0.event_type().to_string(),
            name: self.0.name().to_string(),
            version: self.0.version(),
        }
    }

    fn apply(&self, model: Arc<M>, event: &BrookEvent) -> KernelResult<Arc<M>> {
        let payload: R::Event = event.decode()?;

        // Holding the input keeps its allocation alive, so an equal pointer
        // afterwards can only mean the reducer returned the same instance.
        let input = Arc::clone(&model);
        let output = self.0.reduce(model, payload);

        if Arc::ptr_eq(&input, &output) {
            return Err(KernelError::ReducerInvariantViolation {
                reducer: self.0.name().to_string(),
                event_type: event.event_type().to_string(),
            });
        }

        Ok(output)
    }
}

/// Type-dispatched fold over an ordered event sequence.
pub struct RootReducer<M> {
    model_name: String,
    reducers: FxHashMap<String, Box<dyn ErasedReducer<M>>>,
    policy: UnhandledEventPolicy,
    fingerprint: ReducerSetFingerprint,
}

impl<M: Send + Sync + 'static> RootReducer<M> {
    /// `model_name` identifies the model in fingerprints; keep it stable.
    pub fn builder(model_name: impl Into<String>) -> RootReducerBuilder<M> {
        RootReducerBuilder {
            model_name: model_name.into(),
            reducers: FxHashMap::default(),
            policy: UnhandledEventPolicy::default(),
            duplicate: None,
        }
    }

    /// Fold a single event.
    pub fn reduce_one(&self, model: Arc<M>, event: &BrookEvent) -> KernelResult<Arc<M>> {
        match self.reducers.get(event.event_type()) {
            Some(reducer) => reducer.apply(model, event),
            None => match self.policy {
                UnhandledEventPolicy::Skip => Ok(model),
                UnhandledEventPolicy::Reject => {
                    Err(KernelError::UnhandledEvent(event.event_type().to_string()))
                }
            },
        }
    }

    /// Fold `events` in order, starting from `initial`.
    pub fn reduce<I>(&self, initial: Arc<M>, events: I) -> KernelResult<Arc<M>>
    where
        I: IntoIterator,
        I::Item: Borrow<BrookEvent>,
    {
        events
            .into_iter()
            .try_fold(initial, |model, event| self.reduce_one(model, event.borrow()))
    }

    pub fn fingerprint(&self) -> ReducerSetFingerprint {
        self.fingerprint
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn policy(&self) -> UnhandledEventPolicy {
        self.policy
    }

    pub fn handles(&self, event_type: &str) -> bool {
        self.reducers.contains_key(event_type)
    }

    pub fn descriptors(&self) -> Vec<ReducerDescriptor> {
        let mut descriptors: Vec<_> = self.reducers.values().map(|r| r.descriptor()).collect();
        descriptors.sort_by(|a, b| a.event_type.cmp(&b.event_type));
        descriptors
    }
}

impl<M> fmt::Debug for RootReducer<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootReducer")
            .field("model", &self.model_name)
            .field("reducers", &self.reducers.len())
            .field("policy", &self.policy)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

pub struct RootReducerBuilder<M> {
    model_name: String,
    reducers: FxHashMap<String, Box<dyn ErasedReducer<M>>>,
    policy: UnhandledEventPolicy,
    duplicate: Option<String>,
}

impl<M: Send + Sync + 'static> RootReducerBuilder<M> {
    pub fn register<R: Reducer<M>>(mut self, reducer: R) -> Self {
        let event_type = reducer.event_type().to_string();
        if self.reducers.contains_key(&event_type) {
            self.duplicate.get_or_insert(event_type);
            return self;
        }
        self.reducers.insert(event_type, Box::new(Registered(reducer)));
        self
    }

    pub fn unhandled_events(mut self, policy: UnhandledEventPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> KernelResult<RootReducer<M>> {
        if let Some(event_type) = self.duplicate {
            return Err(KernelError::DuplicateReducer(event_type));
        }

        let descriptors: Vec<_> = self.reducers.values().map(|r| r.descriptor()).collect();
        let fingerprint = ReducerSetFingerprint::compute(&self.model_name, &descriptors);

        Ok(RootReducer {
            model_name: self.model_name,
            reducers: self.reducers,
            policy: self.policy,
            fingerprint,
        })
    }
}

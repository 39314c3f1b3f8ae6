// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use brook_kernel::{BrookEvent, BrookKey, Reducer, RootReducer};
use brook_node::config::EngineConfig;
use brook_node::{BrookEngine, BrookStore};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub total: i64,
    pub applied: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incremented {
    pub by: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reset;

pub struct IncrementedReducer {
    pub version: u32,
}

impl Reducer<Counter> for IncrementedReducer {
    type Event = Incremented;

    fn event_type(&self) -> &str {
        "Incremented"
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn reduce(&self, model: Arc<Counter>, event: Incremented) -> Arc<Counter> {
        Arc::new(Counter {
            total: model.total + event.by,
            applied: model.applied + 1,
        })
    }
}

pub struct ResetReducer;

impl Reducer<Counter> for ResetReducer {
    type Event = Reset;

    fn event_type(&self) -> &str {
        "Reset"
    }

    fn reduce(&self, model: Arc<Counter>, _event: Reset) -> Arc<Counter> {
        Arc::new(Counter {
            total: 0,
            applied: model.applied + 1,
        })
    }
}

/// Hands back its input instead of a new model.
pub struct SneakyReducer;

impl Reducer<Counter> for SneakyReducer {
    type Event = Incremented;

    fn event_type(&self) -> &str {
        "Sneaky"
    }

    fn reduce(&self, model: Arc<Counter>, _event: Incremented) -> Arc<Counter> {
        model
    }
}

pub fn counter_reducers() -> RootReducer<Counter> {
    counter_reducers_v(1)
}

pub fn counter_reducers_v(version: u32) -> RootReducer<Counter> {
    RootReducer::<Counter>::builder("Counter")
        .register(IncrementedReducer { version })
        .register(ResetReducer)
        .build()
        .unwrap()
}

pub fn key(id: &str) -> BrookKey {
    BrookKey::new("counter", id).unwrap()
}

pub fn incremented(n: i64) -> BrookEvent {
    BrookEvent::json(format!("inc-{}", n), "tests", "Incremented", &Incremented { by: n })
        .unwrap()
        .stamped()
}

pub fn reset() -> BrookEvent {
    BrookEvent::json("reset", "tests", "Reset", &Reset).unwrap().stamped()
}

/// Retries fast enough for tests.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

pub fn engine<S: BrookStore>(store: Arc<S>) -> BrookEngine<S> {
    BrookEngine::new(store, test_config()).unwrap()
}

/// Fold events synchronously from the default model.
pub fn fold(events: &[BrookEvent]) -> Counter {
    let model = counter_reducers()
        .reduce(Arc::new(Counter::default()), events)
        .unwrap();
    (*model).clone()
}

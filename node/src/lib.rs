// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Brook engine: append-only event streams with crash-safe head commits,
//! bounded-retry reads and fingerprinted snapshot rebuilds.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod storage;
pub mod retry;
pub mod exclusive;
pub mod recovery;
pub mod notify;
pub mod appender;
pub mod reader;
pub mod replay;
pub mod snapshot;
pub mod projection;
pub mod engine;

pub use config::EngineConfig;
pub use engine::BrookEngine;
pub use errors::{BrookError, BrookResult, ErrorKind};
pub use reader::{EventStream, ReadOutcome};
pub use snapshot::{ModelSource, SnapshotEngine, Versioned};
pub use storage::{BrookStore, FileStore, InMemoryStore};

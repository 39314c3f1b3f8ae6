// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! brook-kernel: keys, positions, events and reducers for append-only event streams.
//!
//! Everything in this crate is synchronous and storage-agnostic. The async
//! engine that persists brooks lives in `brook-node`.

pub mod error;
pub mod key;
pub mod position;
pub mod event;
pub mod codec;
pub mod fingerprint;
pub mod reducer;

pub use error::{KernelError, KernelResult};
pub use event::BrookEvent;
pub use fingerprint::ReducerSetFingerprint;
pub use key::{BrookKey, BrookRangeKey};
pub use position::{BrookPosition, ExpectedVersion};
pub use reducer::{Reducer, ReducerDescriptor, RootReducer, RootReducerBuilder, UnhandledEventPolicy};

#[cfg(test)]
pub mod tests;

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event Replay
//!
//! Async fold of an event stream through a `RootReducer`. Cancellation is
//! checked between events, never inside a fold step, so a cancelled replay
//! never leaves a half-applied event behind.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use brook_kernel::{BrookEvent, KernelError, RootReducer};

use crate::errors::{BrookError, BrookResult};

/// Model after a replay and how many events went into it.
#[derive(Debug)]
pub struct Folded<M> {
    pub model: Arc<M>,
    pub applied: u64,
}

pub async fn fold_stream<M, St>(
    root: &RootReducer<M>,
    initial: Arc<M>,
    events: St,
    cancel: &CancellationToken,
) -> BrookResult<Folded<M>>
where
    M: Send + Sync + 'static,
    St: Stream<Item = BrookResult<BrookEvent>>,
{
    futures::pin_mut!(events);
    let mut model = initial;
    let mut applied = 0u64;

    while let Some(event) = events.next().await {
        if cancel.is_cancelled() {
            return Err(BrookError::Cancelled);
        }
        let event = event?;

        model = match root.reduce_one(model, &event) {
            Ok(next) => next,
            Err(err) => {
                if let KernelError::ReducerInvariantViolation { reducer, event_type } = &err {
                    tracing::error!(
                        model = root.model_name(),
                        reducer = %reducer,
                        event_type = %event_type,
                        event_id = event.id(),
                        "reducer returned its input instead of a new model"
                    );
                }
                return Err(err.into());
            }
        };
        applied += 1;
    }

    Ok(Folded { model, applied })
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use thiserror::Error;

use brook_kernel::{BrookKey, BrookPosition, ExpectedVersion, KernelError};

use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum BrookError {
    #[error("Concurrency conflict on {key}: expected {expected:?}, head is {actual}")]
    ConcurrencyConflict {
        key: BrookKey,
        expected: ExpectedVersion,
        actual: BrookPosition,
    },

    #[error("Payload too large for {operation}: {source}")]
    PayloadTooLarge {
        operation: String,
        #[source]
        source: StoreError,
    },

    #[error("Not found: {0}")]
    NotFound(#[source] StoreError),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    TransientStoreFailure {
        operation: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("{operation} failed: {source}")]
    Store {
        operation: String,
        #[source]
        source: StoreError,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Enumeration of {key} aborted: requested through {requested}, reached {reached}")]
    EnumerationAborted {
        key: BrookKey,
        requested: BrookPosition,
        reached: BrookPosition,
    },

    #[error("Position {requested} unavailable for {key}: head is {head}")]
    PositionUnavailable {
        key: BrookKey,
        requested: BrookPosition,
        head: BrookPosition,
    },

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("Codec error: {0}")]
    Codec(String),
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConcurrencyConflict,
    TransientStoreFailure,
    PayloadTooLarge,
    NotFound,
    EnumerationAborted,
    ReducerInvariantViolation,
    PositionUnavailable,
    Cancelled,
    Store,
    Invalid,
}

impl BrookError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrookError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            BrookError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            BrookError::NotFound(_) => ErrorKind::NotFound,
            BrookError::TransientStoreFailure { .. } => ErrorKind::TransientStoreFailure,
            BrookError::Store { .. } => ErrorKind::Store,
            BrookError::Cancelled => ErrorKind::Cancelled,
            BrookError::EnumerationAborted { .. } => ErrorKind::EnumerationAborted,
            BrookError::PositionUnavailable { .. } => ErrorKind::PositionUnavailable,
            BrookError::Kernel(KernelError::ReducerInvariantViolation { .. }) => {
                ErrorKind::ReducerInvariantViolation
            }
            BrookError::Kernel(_) | BrookError::Codec(_) => ErrorKind::Invalid,
        }
    }

    pub(crate) fn codec(context: &str, err: impl std::fmt::Display) -> Self {
        BrookError::Codec(format!("{}: {}", context, err))
    }
}

pub type BrookResult<T> = std::result::Result<T, BrookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reducer_violation_is_classified() {
        let err = BrookError::from(KernelError::ReducerInvariantViolation {
            reducer: "Added".into(),
            event_type: "Added".into(),
        });
        assert_eq!(err.kind(), ErrorKind::ReducerInvariantViolation);
    }

    #[test]
    fn test_other_kernel_errors_are_invalid() {
        let err = BrookError::from(KernelError::PositionOverflow);
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}

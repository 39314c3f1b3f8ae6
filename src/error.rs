//! Error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Key component empty, containing the separator, or too long.
    #[error("Invalid brook key: {0}")]
    InvalidKey(String),

    /// Positions below the `-1` sentinel.
    #[error("Invalid brook position {0}: positions must be >= -1")]
    InvalidPosition(i64),

    #[error("Invalid brook range [{start}, {end}]")]
    InvalidRange { start: i64, end: i64 },

    #[error("Brook position overflow")]
    PositionOverflow,

    /// Events must carry a time before they are mapped to storage.
    #[error("Event {event_id} has no time and cannot be persisted")]
    MissingEventTime { event_id: String },

    /// A reducer handed back the model instance it was given.
    #[error("Reducer {reducer} returned its input model for event type {event_type}")]
    ReducerInvariantViolation { reducer: String, event_type: String },

    #[error("No reducer registered for event type {0}")]
    UnhandledEvent(String),

    #[error("A reducer is already registered for event type {0}")]
    DuplicateReducer(String),

    #[error("Unsupported data content type: {0}")]
    UnsupportedContentType(String),

    #[error("Failed to decode {event_type} payload: {reason}")]
    Decode { event_type: String, reason: String },

    #[error("Failed to encode payload: {0}")]
    Encode(String),
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;

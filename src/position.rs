// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Stream positions.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};

/// Monotonic sequence cursor within a brook.
///
/// `-1` is the "not set" sentinel used for empty brooks. Every other value is
/// the offset of a committed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct BrookPosition(i64);

impl BrookPosition {
    pub const NOT_SET: Self = Self(-1);
    pub const ZERO: Self = Self(0);

    pub fn new(value: i64) -> KernelResult<Self> {
        if value < -1 {
            return Err(KernelError::InvalidPosition(value));
        }
        Ok(Self(value))
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_set(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_newer_than(self, other: Self) -> bool {
        self.0 > other.0
    }

    /// Position `count` events after this one.
    pub fn advance(self, count: u64) -> KernelResult<Self> {
        let count = i64::try_from(count).map_err(|_| KernelError::PositionOverflow)?;
        self.0
            .checked_add(count)
            .map(Self)
            .ok_or(KernelError::PositionOverflow)
    }

    pub fn next(self) -> KernelResult<Self> {
        self.advance(1)
    }

    /// The position just before this one, saturating at the sentinel.
    pub fn previous(self) -> Self {
        Self((self.0 - 1).max(-1))
    }
}

impl Default for BrookPosition {
    fn default() -> Self {
        Self::NOT_SET
    }
}

impl fmt::Display for BrookPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for BrookPosition {
    type Error = KernelError;

    fn try_from(value: i64) -> KernelResult<Self> {
        Self::new(value)
    }
}

impl From<BrookPosition> for i64 {
    fn from(position: BrookPosition) -> Self {
        position.0
    }
}

/// Optimistic concurrency expectation for an append.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// Skip the check.
    Any,
    /// The brook head must equal this position.
    Exact(BrookPosition),
}

impl ExpectedVersion {
    /// The brook must be empty.
    pub const EMPTY: Self = Self::Exact(BrookPosition::NOT_SET);

    pub fn matches(self, head: BrookPosition) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(expected) => expected == head,
        }
    }
}

impl From<BrookPosition> for ExpectedVersion {
    fn from(position: BrookPosition) -> Self {
        Self::Exact(position)
    }
}

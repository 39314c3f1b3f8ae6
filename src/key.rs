// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Brook identity.
//!
//! A brook is addressed by a `(type, id)` pair. The pair is the partition
//! identity for every storage operation, so it is validated once at
//! construction and never changes afterwards.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::position::BrookPosition;

/// Separator between the type and id components in the canonical form.
pub const KEY_SEPARATOR: char = '|';

/// Maximum length of `type|id` in characters, separator included.
pub const MAX_KEY_LENGTH: usize = 1024;

/// Composite `(type, id)` identity of a brook.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BrookKey {
    brook_type: String,
    id: String,
}

impl BrookKey {
    pub fn new(brook_type: impl Into<String>, id: impl Into<String>) -> KernelResult<Self> {
        let brook_type = brook_type.into();
        let id = id.into();

        validate_component("type", &brook_type)?;
        validate_component("id", &id)?;

        let total = brook_type.chars().count() + 1 + id.chars().count();
        if total > MAX_KEY_LENGTH {
            return Err(KernelError::InvalidKey(format!(
                "key is {} characters, maximum is {}",
                total, MAX_KEY_LENGTH
            )));
        }

        Ok(Self { brook_type, id })
    }

    /// Parse the canonical `type|id` form.
    pub fn parse(raw: &str) -> KernelResult<Self> {
        match raw.split_once(KEY_SEPARATOR) {
            Some((brook_type, id)) => Self::new(brook_type, id),
            None => Err(KernelError::InvalidKey(format!(
                "'{}' has no '{}' separator",
                raw, KEY_SEPARATOR
            ))),
        }
    }

    pub fn brook_type(&self) -> &str {
        &self.brook_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

fn validate_component(name: &str, value: &str) -> KernelResult<()> {
    if value.is_empty() {
        return Err(KernelError::InvalidKey(format!("{} must not be empty", name)));
    }
    if value.contains(KEY_SEPARATOR) {
        return Err(KernelError::InvalidKey(format!(
            "{} '{}' contains reserved separator '{}'",
            name, value, KEY_SEPARATOR
        )));
    }
    Ok(())
}

impl fmt::Display for BrookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.brook_type, KEY_SEPARATOR, self.id)
    }
}

impl TryFrom<String> for BrookKey {
    type Error = KernelError;

    fn try_from(value: String) -> KernelResult<Self> {
        Self::parse(&value)
    }
}

impl From<BrookKey> for String {
    fn from(key: BrookKey) -> Self {
        key.to_string()
    }
}

/// Inclusive slice `[start, end]` of a brook.
///
/// `end == start - 1` describes an empty range, which is what reading an
/// empty brook from position 0 produces.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrookRangeKey {
    key: BrookKey,
    start: BrookPosition,
    end: BrookPosition,
}

impl BrookRangeKey {
    pub fn new(key: BrookKey, start: BrookPosition, end: BrookPosition) -> KernelResult<Self> {
        if !start.is_set() || end.value() < start.value() - 1 {
            return Err(KernelError::InvalidRange {
                start: start.value(),
                end: end.value(),
            });
        }
        Ok(Self { key, start, end })
    }

    /// Range from the first event up to and including `end`.
    pub fn through(key: BrookKey, end: BrookPosition) -> Self {
        Self {
            key,
            start: BrookPosition::ZERO,
            end,
        }
    }

    pub fn key(&self) -> &BrookKey {
        &self.key
    }

    pub fn start(&self) -> BrookPosition {
        self.start
    }

    pub fn end(&self) -> BrookPosition {
        self.end
    }

    /// Number of events the range covers.
    pub fn len(&self) -> u64 {
        (self.end.value() - self.start.value() + 1).max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, position: BrookPosition) -> bool {
        position.value() >= self.start.value() && position.value() <= self.end.value()
    }
}

impl fmt::Display for BrookRangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..={}]", self.key, self.start, self.end)
    }
}

// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Reducer-set fingerprints.
//!
//! A snapshot is only reusable by the exact reducer set that produced it. The
//! fingerprint is a BLAKE3 hash over the model type and the sorted reducer
//! descriptors, so adding, removing or re-versioning a reducer invalidates
//! every snapshot built before the change.
//!
//! # Hash Input Structure
//! ```text
//! "brook-reducer-set/v1"
//! model type name (len u32 LE, bytes)
//! reducer count (u32 LE)
//! For each reducer, sorted by event type:
//!   event_type (len u32 LE, bytes)
//!   reducer name (len u32 LE, bytes)
//!   version (u32 LE)
//! ```

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::reducer::ReducerDescriptor;

const DOMAIN: &[u8] = b"brook-reducer-set/v1";

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReducerSetFingerprint([u8; 32]);

impl ReducerSetFingerprint {
    pub fn compute(model_type: &str, descriptors: &[ReducerDescriptor]) -> Self {
        let mut sorted: Vec<&ReducerDescriptor> = descriptors.iter().collect();
        sorted.sort_by(|a, b| a.event_type.cmp(&b.event_type).then(a.name.cmp(&b.name)));

        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN);
        update_str(&mut hasher, model_type);
        hasher.update(&(sorted.len() as u32).to_le_bytes());

        for descriptor in sorted {
            update_str(&mut hasher, &descriptor.event_type);
            update_str(&mut hasher, &descriptor.name);
            hasher.update(&descriptor.version.to_le_bytes());
        }

        Self(*hasher.finalize().as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(raw: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(raw, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// First 8 bytes in hex, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

fn update_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u32).to_le_bytes());
    hasher.update(value.as_bytes());
}

impl fmt::Display for ReducerSetFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ReducerSetFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReducerSetFingerprint({})", self.short())
    }
}

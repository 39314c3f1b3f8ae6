// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Brook events.
//!
//! A `BrookEvent` is an immutable value. Once committed it is never mutated
//! or deleted by the engine; the only way to change history is operator
//! maintenance outside this crate.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec::PayloadCodec;
use crate::error::{KernelError, KernelResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrookEvent {
    id: String,
    source: String,
    event_type: String,
    data_content_type: String,
    data: Vec<u8>,
    time: Option<DateTime<Utc>>,
}

impl BrookEvent {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
        data_content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            event_type: event_type.into(),
            data_content_type: data_content_type.into(),
            data,
            time: None,
        }
    }

    /// Event with a JSON-encoded payload.
    pub fn json<T: Serialize>(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: &T,
    ) -> KernelResult<Self> {
        Self::encoded(PayloadCodec::Json, id, source, event_type, payload)
    }

    /// Event with a bincode-encoded payload.
    pub fn bincode<T: Serialize>(
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: &T,
    ) -> KernelResult<Self> {
        Self::encoded(PayloadCodec::Bincode, id, source, event_type, payload)
    }

    fn encoded<T: Serialize>(
        codec: PayloadCodec,
        id: impl Into<String>,
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: &T,
    ) -> KernelResult<Self> {
        let data = codec.encode(payload)?;
        Ok(Self::new(id, source, event_type, codec.content_type(), data))
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Stamp with the current time unless a time is already present.
    pub fn stamped(self) -> Self {
        match self.time {
            Some(_) => self,
            None => self.with_time(Utc::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn data_content_type(&self) -> &str {
        &self.data_content_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.time
    }

    /// The event time, required before the event can be persisted.
    pub fn require_time(&self) -> KernelResult<DateTime<Utc>> {
        self.time.ok_or_else(|| KernelError::MissingEventTime {
            event_id: self.id.clone(),
        })
    }

    /// Decode the payload according to the data content type.
    pub fn decode<T: DeserializeOwned>(&self) -> KernelResult<T> {
        PayloadCodec::for_content_type(&self.data_content_type)?.decode(&self.event_type, &self.data)
    }

    /// Split into owned parts: `(id, source, event_type, data_content_type, data, time)`.
    pub fn into_parts(self) -> (String, String, String, String, Vec<u8>, Option<DateTime<Utc>>) {
        (
            self.id,
            self.source,
            self.event_type,
            self.data_content_type,
            self.data,
            self.time,
        )
    }
}

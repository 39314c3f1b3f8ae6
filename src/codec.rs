// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Event payload codecs, selected by data content type.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{KernelError, KernelResult};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_BINCODE: &str = "application/x-bincode";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadCodec {
    Json,
    Bincode,
}

impl PayloadCodec {
    /// Resolve a codec from a data content type, ignoring media type parameters.
    pub fn for_content_type(content_type: &str) -> KernelResult<Self> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            CONTENT_TYPE_JSON => Ok(PayloadCodec::Json),
            CONTENT_TYPE_BINCODE => Ok(PayloadCodec::Bincode),
            _ => Err(KernelError::UnsupportedContentType(content_type.to_string())),
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            PayloadCodec::Json => CONTENT_TYPE_JSON,
            PayloadCodec::Bincode => CONTENT_TYPE_BINCODE,
        }
    }

    pub fn encode<T: Serialize>(self, value: &T) -> KernelResult<Vec<u8>> {
        match self {
            PayloadCodec::Json => {
                serde_json::to_vec(value).map_err(|e| KernelError::Encode(e.to_string()))
            }
            PayloadCodec::Bincode => {
                bincode::serde::encode_to_vec(value, bincode::config::standard())
                    .map_err(|e| KernelError::Encode(e.to_string()))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(self, event_type: &str, bytes: &[u8]) -> KernelResult<T> {
        let decode_err = |reason: String| KernelError::Decode {
            event_type: event_type.to_string(),
            reason,
        };

        match self {
            PayloadCodec::Json => serde_json::from_slice(bytes).map_err(|e| decode_err(e.to_string())),
            PayloadCodec::Bincode => {
                bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                    .map(|(value, _)| value)
                    .map_err(|e| decode_err(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parameters_ignored() {
        let codec = PayloadCodec::for_content_type("Application/JSON; charset=utf-8").unwrap();
        assert_eq!(codec, PayloadCodec::Json);
    }

    #[test]
    fn test_unknown_content_type_rejected() {
        let result = PayloadCodec::for_content_type("text/plain");
        assert!(matches!(result, Err(KernelError::UnsupportedContentType(_))));
    }

    #[test]
    fn test_bincode_decode_reports_event_type() {
        let err = PayloadCodec::Bincode
            .decode::<String>("Renamed", &[0xFF, 0xFF, 0xFF])
            .unwrap_err();
        match err {
            KernelError::Decode { event_type, .. } => assert_eq!(event_type, "Renamed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

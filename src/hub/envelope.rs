//! Envelope
//!
//! The typed message unit exchanged between sessions: a string discriminator
//! plus an opaque, already-serialized payload.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{DecodingError, EncodingError};

/// An immutable message routed by the hub
///
/// The payload is kept in serialized form. The hub never looks inside it;
/// interpreting it is up to the handlers and peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: String,
    payload: Vec<u8>,
}

impl Envelope {
    /// Create an envelope by serializing `value` as JSON
    pub fn new<T>(kind: impl Into<String>, value: &T) -> Result<Self, EncodingError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_vec(value)?;
        Ok(Self {
            kind: kind.into(),
            payload,
        })
    }

    /// Wrap bytes that are already serialized
    pub fn from_raw(kind: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
        }
    }

    /// Create an envelope without a payload
    pub fn empty(kind: impl Into<String>) -> Self {
        Self::from_raw(kind, Vec::new())
    }

    /// Message discriminator
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Serialized payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Deserialize the payload into a typed value
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, DecodingError> {
        if self.payload.is_empty() {
            return Err(DecodingError::EmptyPayload);
        }
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Chat {
        room: String,
        text: String,
    }

    #[test]
    fn test_new_serializes_value() {
        let chat = Chat {
            room: "lobby".to_string(),
            text: "hello".to_string(),
        };
        let envelope = Envelope::new("chat", &chat).unwrap();

        assert_eq!(envelope.kind(), "chat");
        assert_eq!(
            envelope.payload(),
            br#"{"room":"lobby","text":"hello"}"#.as_slice()
        );
        assert_eq!(envelope.decode_payload::<Chat>().unwrap(), chat);
    }

    #[test]
    fn test_new_rejects_unserializable_value() {
        use std::collections::HashMap;

        // JSON object keys must be strings
        let mut map = HashMap::new();
        map.insert(vec![1u8, 2], "value");

        let result = Envelope::new("bad", &map);
        assert!(matches!(result, Err(EncodingError::Serialize(_))));
    }

    #[test]
    fn test_empty_envelope() {
        let envelope = Envelope::empty("ping");
        assert!(envelope.is_empty());
        assert!(matches!(
            envelope.decode_payload::<serde_json::Value>(),
            Err(DecodingError::EmptyPayload)
        ));
    }

    #[test]
    fn test_decode_payload_malformed() {
        let envelope = Envelope::from_raw("chat", "{not json");
        assert!(matches!(
            envelope.decode_payload::<serde_json::Value>(),
            Err(DecodingError::Malformed(_))
        ));
    }
}

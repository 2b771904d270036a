//! Wire codec
//!
//! Turns envelopes into frame bytes and back. The hub only talks to the
//! [`Codec`] trait; [`JsonCodec`] is the default wire format:
//!
//! ```json
//! {"type": "chat", "data": {"text": "hello"}}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use super::envelope::Envelope;
use super::error::{DecodingError, EncodingError};

/// Envelope encoding used by session pumps
pub trait Codec: Send + Sync + 'static {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, EncodingError>;

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, DecodingError>;
}

/// JSON object codec: `type` carries the kind, `data` the raw payload
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Serialize)]
struct WireOut<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a RawValue>,
}

#[derive(Deserialize)]
struct WireIn {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, deserialize_with = "present")]
    data: Option<Box<RawValue>>,
}

// A plain `Option` maps `null` to `None`; keep a literal null as payload.
fn present<'de, D>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, EncodingError> {
        let data = if envelope.is_empty() {
            None
        } else {
            let raw: &RawValue = serde_json::from_slice(envelope.payload())
                .map_err(|e| EncodingError::InvalidPayload(e.to_string()))?;
            // Whitespace around `data` is lost on decode.
            if raw.get().len() != envelope.payload().len() {
                return Err(EncodingError::InvalidPayload(
                    "payload has leading or trailing whitespace".to_string(),
                ));
            }
            Some(raw)
        };

        let wire = WireOut {
            kind: envelope.kind(),
            data,
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope, DecodingError> {
        let wire: WireIn = serde_json::from_slice(bytes)?;
        let payload = wire
            .data
            .map(|raw| raw.get().as_bytes().to_vec())
            .unwrap_or_default();
        Ok(Envelope::from_raw(wire.kind, payload))
    }
}

//! Serialization and deserialization for the Callroom wire protocol.
//!
//! Text frames use JSON via `serde_json`; binary frames use postcard.
//! Text decoding stops at what routing needs, so a decoded `voice-data`
//! frame is relayed as received rather than re-encoded.

use crate::event::{BinaryFrame, ClientEvent, Envelope, EventName, VoiceTarget};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A text frame is not a valid JSON event envelope.
    #[error("invalid JSON frame: {0}")]
    Json(String),
    /// A binary frame could not be encoded or decoded with postcard.
    #[error("invalid binary frame: {0}")]
    Binary(String),
}

/// Decodes the routing information of a text frame.
///
/// Only the envelope, the `join-room` room name and the `voice-data`
/// `roomId` are parsed. The rest of a voice payload is skipped without
/// being materialized, so its nesting depth is not limited.
///
/// # Errors
///
/// Returns `CodecError::Json` for malformed JSON, unknown event names, or a
/// `voice-data` payload that is not an object with a string `roomId`.
pub fn decode_text(text: &str) -> Result<ClientEvent, CodecError> {
    let envelope: Envelope<'_> =
        serde_json::from_str(text).map_err(|e| CodecError::Json(e.to_string()))?;
    let data = envelope.data.get();

    match envelope.event {
        EventName::JoinRoom => serde_json::from_str(data)
            .map(ClientEvent::JoinRoom)
            .map_err(|e| CodecError::Json(e.to_string())),
        EventName::VoiceData => {
            // Derived struct impls also accept a sequence; payloads must be objects.
            if !data.starts_with('{') {
                return Err(CodecError::Json(
                    "voice-data payload must be a JSON object".to_string(),
                ));
            }
            let target: VoiceTarget =
                serde_json::from_str(data).map_err(|e| CodecError::Json(e.to_string()))?;
            Ok(ClientEvent::VoiceData {
                room_id: target.room_id,
            })
        }
    }
}

/// Decodes a [`BinaryFrame`] from postcard bytes.
///
/// Trailing bytes after a complete frame are rejected.
///
/// # Errors
///
/// Returns `CodecError::Binary` if the bytes are not a complete frame.
pub fn decode_binary(bytes: &[u8]) -> Result<BinaryFrame, CodecError> {
    let (frame, rest) = postcard::take_from_bytes::<BinaryFrame>(bytes)
        .map_err(|e| CodecError::Binary(e.to_string()))?;
    if !rest.is_empty() {
        return Err(CodecError::Binary(format!(
            "{} trailing bytes after frame",
            rest.len()
        )));
    }
    Ok(frame)
}

/// Encodes a [`BinaryFrame`] into postcard bytes.
///
/// # Errors
///
/// Returns `CodecError::Binary` if the frame cannot be serialized.
pub fn encode_binary(frame: &BinaryFrame) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(frame).map_err(|e| CodecError::Binary(e.to_string()))
}

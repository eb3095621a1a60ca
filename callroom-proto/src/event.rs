//! Event types exchanged between clients and the relay.
//!
//! Text frames carry JSON envelopes of the form
//! `{"event": "<name>", "data": <payload>}`, using the event names
//! `join-room` and `voice-data`. Binary frames carry a postcard-encoded
//! [`BinaryFrame`] for compact raw audio.
//!
//! The relay never rebuilds a `voice-data` payload. It reads the envelope
//! and the payload's `roomId`, then forwards the frame it received.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::room::RoomId;

/// Event names understood on text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    /// `join-room`: `data` is the room identifier.
    JoinRoom,
    /// `voice-data`: `data` is an object carrying `roomId`.
    VoiceData,
}

/// A text-frame envelope with its payload left unparsed.
///
/// Borrowing `data` as a [`RawValue`] keeps the payload out of the
/// deserializer's nesting limit and leaves its bytes untouched.
#[derive(Debug, Deserialize)]
pub struct Envelope<'a> {
    /// Which event the frame carries.
    pub event: EventName,
    /// The payload exactly as it appeared in the frame.
    #[serde(borrow)]
    pub data: &'a RawValue,
}

/// The routing view of a `voice-data` payload. Every other field is skipped.
#[derive(Debug, Deserialize)]
pub(crate) struct VoiceTarget {
    #[serde(rename = "roomId")]
    pub(crate) room_id: RoomId,
}

/// What the relay needs to act on a text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Request membership in the named room.
    JoinRoom(RoomId),
    /// Opaque data to fan out to the other members of `room_id`.
    VoiceData {
        /// Destination room, read from the payload's `roomId` field.
        room_id: RoomId,
    },
}

/// Binary-frame counterpart of [`ClientEvent`], encoded with postcard.
///
/// Relayed binary voice frames are forwarded byte-for-byte, so the same type
/// describes both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryFrame {
    /// Request membership in the named room.
    JoinRoom {
        /// Room to join.
        room_id: RoomId,
    },
    /// Raw audio bytes for the other members of `room_id`.
    VoiceData {
        /// Destination room.
        room_id: RoomId,
        /// Opaque audio data; never inspected by the relay.
        audio: Vec<u8>,
    },
}

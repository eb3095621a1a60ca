// Test-specific lint overrides: property tests use unwrap/expect freely.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::missing_panics_doc)]

//! Property-based codec tests.
//!
//! Uses proptest to verify:
//! 1. The destination room is read from arbitrary `voice-data` payloads,
//!    whatever number literals, nesting or spacing the rest of the payload
//!    uses. Nothing but the room is parsed, so no value is ever rewritten.
//! 2. Random text and random bytes never cause a panic in the decoders.

use callroom_proto::codec;
use callroom_proto::event::ClientEvent;
use callroom_proto::room::RoomId;
use proptest::prelude::*;

/// Strategy for JSON leaf values, rendered as source text.
///
/// Numbers include forms that do not survive a parse/serialize round trip:
/// exponents, integers beyond `u64`, and floats with more digits than `f64`
/// holds.
fn arb_leaf() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("null".to_string()),
        any::<bool>().prop_map(|b| b.to_string()),
        any::<i64>().prop_map(|n| n.to_string()),
        "-?[1-9][0-9]{20,40}",
        any::<f64>()
            .prop_filter("JSON has no NaN or infinity", |f| f.is_finite())
            .prop_map(|f| format!("{f:e}")),
        "-?(0|[1-9][0-9]{0,5})\\.[0-9]{1,40}([eE][+-]?[0-9]{1,3})?",
        "[a-zA-Z0-9+/=]{0,32}".prop_map(|s| format!("\"{s}\"")),
    ]
}

/// Optional whitespace between tokens.
fn arb_space() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just(""), Just(" "), Just("\n  ")]
}

/// Strategy for nested JSON values, a few levels deep, rendered as text.
fn arb_value() -> impl Strategy<Value = String> {
    arb_leaf().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            (prop::collection::vec(inner.clone(), 0..4), arb_space())
                .prop_map(|(items, sp)| format!("[{sp}{}{sp}]", items.join(","))),
            (prop::collection::vec(("[a-z]{1,8}", inner), 0..4), arb_space()).prop_map(
                |(entries, sp)| {
                    let fields: Vec<String> = entries
                        .into_iter()
                        .map(|(key, value)| format!("\"{key}\":{sp}{value}"))
                        .collect();
                    format!("{{{sp}{}{sp}}}", fields.join(","))
                }
            ),
        ]
    })
}

/// Strategy for a `voice-data` frame with `roomId` at a random position.
fn arb_voice_frame() -> impl Strategy<Value = (String, String)> {
    (
        "[a-z0-9-]{0,16}",
        prop::collection::vec(("[a-z]{1,8}", arb_value()), 0..6),
        any::<prop::sample::Index>(),
        arb_space(),
    )
        .prop_map(|(room, fields, position, sp)| {
            let mut entries: Vec<String> = fields
                .into_iter()
                .filter(|(key, _)| key != "roomId")
                .map(|(key, value)| format!("\"{key}\":{sp}{value}"))
                .collect();
            let at = position.index(entries.len() + 1);
            entries.insert(at, format!("\"roomId\":{sp}\"{room}\""));
            let frame = format!(
                "{{\"event\":{sp}\"voice-data\",{sp}\"data\":{sp}{{{}}}}}",
                entries.join(",")
            );
            (room, frame)
        })
}

proptest! {
    #[test]
    fn voice_frame_room_is_found((room, frame) in arb_voice_frame()) {
        let event = codec::decode_text(&frame).unwrap();
        prop_assert_eq!(event, ClientEvent::VoiceData { room_id: RoomId::new(room) });
    }

    #[test]
    fn decode_text_never_panics(text in ".{0,256}") {
        let _ = codec::decode_text(&text);
    }

    #[test]
    fn decode_binary_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = codec::decode_binary(&bytes);
    }
}

//! Rendezvous wire codec — spec §4.1.
//!
//! A single line-oriented (one-datagram-one-message) textual format.
//! Every recognized action is a variant of [`ControlMessage`], tagged by
//! an `action` field so the wire bytes stay interoperable with the
//! original attribute-dictionary server/client this system replaces.
//! Anything that doesn't parse as a `ControlMessage` — including
//! non-UTF-8 bytes — is a [`Classification::Data`] tunneled packet.

use crate::error::ProtocolError;
use crate::model::now_unix_ms;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::trace;

/// Member entry as embedded in a `room_joined` roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterMember {
    pub username: String,
    pub public_ip: String,
    pub public_port: u16,
}

/// Room summary entry as embedded in a `room_list` reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomListEntry {
    pub member_count: usize,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    // --- client -> server ---
    CreateRoom {
        room_id: String,
        peer_id: String,
        username: String,
        #[serde(default)]
        port: u16,
    },
    JoinRoom {
        room_id: String,
        peer_id: String,
        username: String,
        #[serde(default)]
        port: u16,
    },
    LeaveRoom {
        room_id: String,
        peer_id: String,
    },
    Keepalive {
        room_id: String,
        peer_id: String,
    },
    GetRooms {},
    /// Client -> server: request a relayed punch toward `target_peer`.
    /// Server -> client: the relayed form, with `target_peer` absent and
    /// `source_public_ip`/`source_public_port` populated instead.
    PunchRequest {
        room_id: String,
        source_peer: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_peer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_public_ip: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_public_port: Option<u16>,
    },

    // --- server -> client ---
    RoomCreated {
        room_id: String,
        status: String,
        public_ip: String,
        public_port: u16,
    },
    RoomJoined {
        room_id: String,
        members: HashMap<String, RosterMember>,
        status: String,
        public_ip: String,
        public_port: u16,
    },
    RoomList {
        rooms: HashMap<String, RoomListEntry>,
    },
    PeerJoined {
        room_id: String,
        peer_id: String,
        username: String,
        public_ip: String,
        public_port: u16,
    },
    PeerLeft {
        room_id: String,
        peer_id: String,
    },

    // --- client -> client, direct ---
    PunchResponse {
        room_id: String,
        peer_id: String,
    },
}

impl ControlMessage {
    /// Classify a raw UDP payload: a control datagram parses as JSON with
    /// a recognized `action`; everything else — including non-UTF-8
    /// bytes and valid-but-unrecognized JSON — is opaque tunneled data.
    ///
    /// Checking UTF-8 validity up front (rather than letting
    /// `serde_json` fail on invalid bytes) keeps the two failure modes
    /// spec §8's scenario 6 cares about (binary garbage, and
    /// well-formed-but-foreign JSON) both falling through to `Data`
    /// without distinguishing them at this layer.
    pub fn classify(payload: &[u8]) -> Classification<'_> {
        let Ok(text) = std::str::from_utf8(payload) else {
            return Classification::Data(payload);
        };
        match serde_json::from_str::<ControlMessage>(text) {
            Ok(msg) => Classification::Control(msg),
            Err(_) => {
                if let Some(reason) = diagnose_near_miss(text) {
                    trace!(%reason, "payload resembles a control message but did not parse as one");
                }
                Classification::Data(payload)
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // A `ControlMessage` is always representable; failure here would
        // mean a logic bug in this module, not bad input.
        serde_json::to_vec(self).expect("ControlMessage always serializes")
    }

    pub fn room_created(room_id: impl Into<String>, public_ip: String, public_port: u16) -> Self {
        ControlMessage::RoomCreated {
            room_id: room_id.into(),
            status: "success".to_string(),
            public_ip,
            public_port,
        }
    }
}

pub enum Classification<'a> {
    Control(ControlMessage),
    Data(&'a [u8]),
}

/// Best-effort explanation for why valid JSON failed to parse as a
/// [`ControlMessage`], used only for diagnostic logging — callers still
/// treat the payload as opaque [`Classification::Data`] either way
/// (spec §8 scenario 6 does not distinguish the two failure reasons).
fn diagnose_near_miss(text: &str) -> Option<ProtocolError> {
    let value: Value = serde_json::from_str(text).ok()?;
    let action = value.get("action")?.as_str()?;
    let known = matches!(
        action,
        "create_room"
            | "join_room"
            | "leave_room"
            | "keepalive"
            | "get_rooms"
            | "punch_request"
            | "room_created"
            | "room_joined"
            | "room_list"
            | "peer_joined"
            | "peer_left"
            | "punch_response"
    );
    Some(if known {
        ProtocolError::Malformed(text.to_string())
    } else {
        ProtocolError::UnknownAction(action.to_string())
    })
}

/// Convenience: `created_at` timestamps embedded in wire payloads use
/// unix millis, matching `time.time()` (seconds, but spec keeps
/// subsecond precision as milliseconds here for finer test assertions).
pub fn wire_timestamp() -> u64 {
    now_unix_ms()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_room_round_trips() {
        let msg = ControlMessage::CreateRoom {
            room_id: "game-1".into(),
            peer_id: "P1".into(),
            username: "Alice".into(),
            port: 40000,
        };
        let bytes = msg.to_bytes();
        match ControlMessage::classify(&bytes) {
            Classification::Control(parsed) => assert_eq!(parsed, msg),
            Classification::Data(_) => panic!("expected control classification"),
        }
    }

    #[test]
    fn non_utf8_is_data() {
        let payload = [0xff, 0xfe, 0x00, 0x01, 0xde, 0xad];
        assert!(matches!(
            ControlMessage::classify(&payload),
            Classification::Data(_)
        ));
    }

    #[test]
    fn empty_payload_is_data() {
        assert!(matches!(
            ControlMessage::classify(&[]),
            Classification::Data(_)
        ));
    }

    #[test]
    fn well_formed_foreign_json_is_data() {
        let payload = br#"{"hello":"world"}"#;
        assert!(matches!(
            ControlMessage::classify(payload),
            Classification::Data(_)
        ));
    }

    #[test]
    fn arbitrary_binary_is_data() {
        let payload: Vec<u8> = (0u8..=255).collect();
        assert!(matches!(
            ControlMessage::classify(&payload),
            Classification::Data(_)
        ));
    }
}

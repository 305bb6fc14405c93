use thiserror::Error;

/// Errors arising from parsing or handling a single control datagram.
///
/// None of these propagate out of the receive loop (spec §7): the pump
/// and the registry log and drop. The type exists so call sites can
/// match on *why* a datagram was dropped instead of stringly-typed
/// logging, and so tests can assert on the classification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("control payload did not parse as a recognized action: {0}")]
    Malformed(String),

    #[error("unrecognized action '{0}'")]
    UnknownAction(String),

    #[error("no such member (room={room_id}, peer={peer_id})")]
    NotMember { room_id: String, peer_id: String },
}

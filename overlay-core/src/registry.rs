//! Room registry — spec §3, §4.3.
//!
//! A single in-memory table guarded by one mutex (REDESIGN FLAGS:
//! "global mutable room table" -> single owner object). Every mutating
//! operation here is synchronous and non-blocking, so the receive loop
//! never awaits network I/O while holding the lock (spec §5).

use crate::error::ProtocolError;
use crate::model::{Endpoint, Member, PeerId, RoomSummary};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};
use tracing::trace;

/// Default soft-state staleness threshold (spec §4.3: 60s).
pub const STALE_THRESHOLD: Duration = Duration::from_secs(60);
/// Default cleanup tick period (spec §4.3: 30s).
pub const CLEANUP_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Room {
    members: HashMap<PeerId, Member>,
    created_at: Instant,
    created_at_unix_ms: u64,
}

/// Result of a `create_room`/`join_room` handler call: who to notify,
/// and with what.
pub struct JoinOutcome {
    /// Other members already in the room, for the `room_joined` roster
    /// (empty for `create_room`, since spec treats both uniformly and
    /// the distinction is only in which reply action the caller sends).
    pub existing_members: Vec<Member>,
    /// Members (excluding the joiner) to notify with `peer_joined`.
    pub notify: Vec<Member>,
}

/// Result of a `leave_room` call.
pub struct LeaveOutcome {
    /// Surviving members to notify with `peer_left`. Empty if the peer
    /// was not a member (idempotent no-op, spec §7 `NotMember`).
    pub notify: Vec<Member>,
    pub removed: bool,
}

/// In-memory table of rooms and their members. Exclusively owned by the
/// rendezvous server; never exposed outside this module except through
/// the operations below (REDESIGN FLAGS).
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle `create_room`/`join_room`. Both actions have identical
    /// registry semantics (spec §4.3); the caller picks the reply kind.
    pub fn join(
        &mut self,
        room_id: &str,
        peer_id: PeerId,
        username: String,
        endpoint: Endpoint,
    ) -> JoinOutcome {
        let now = Instant::now();
        let room = self.rooms.entry(room_id.to_string()).or_insert_with(|| Room {
            members: HashMap::new(),
            created_at: now,
            created_at_unix_ms: crate::model::now_unix_ms(),
        });

        let existing_members: Vec<Member> = room
            .members
            .values()
            .filter(|m| m.peer_id != peer_id)
            .cloned()
            .collect();

        // Overwriting is deliberate: a reconnecting client reuses its
        // PeerId and should update its endpoint (spec §4.3).
        room.members.insert(
            peer_id.clone(),
            Member {
                peer_id,
                username,
                endpoint,
                last_seen: now,
            },
        );

        JoinOutcome {
            notify: existing_members.clone(),
            existing_members,
        }
    }

    pub fn leave(&mut self, room_id: &str, peer_id: &PeerId) -> LeaveOutcome {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return LeaveOutcome {
                notify: Vec::new(),
                removed: false,
            };
        };
        let removed = room.members.remove(peer_id).is_some();
        let notify: Vec<Member> = room.members.values().cloned().collect();

        if room.members.is_empty() {
            self.rooms.remove(room_id);
        }

        LeaveOutcome { notify, removed }
    }

    /// Refresh `last_seen` and `endpoint` for an existing member.
    /// Silently does nothing if the (room, peer) is unknown (spec §7
    /// `NotMember`, dropped for `keepalive`).
    pub fn keepalive(&mut self, room_id: &str, peer_id: &PeerId, endpoint: Endpoint) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            trace!(error = %not_member(room_id, peer_id), "keepalive for unknown room");
            return;
        };
        let Some(member) = room.members.get_mut(peer_id) else {
            trace!(error = %not_member(room_id, peer_id), "keepalive for unknown member");
            return;
        };
        member.last_seen = Instant::now();
        member.endpoint = endpoint;
    }

    /// Look up a target member's current endpoint for `punch_request`
    /// relay. Returns `None` if the room or the target is unknown
    /// (spec §4.3: dropped silently).
    pub fn member_endpoint(&self, room_id: &str, peer_id: &PeerId) -> Option<Endpoint> {
        let endpoint = self.rooms.get(room_id)?.members.get(peer_id).map(|m| m.endpoint);
        if endpoint.is_none() {
            trace!(error = %not_member(room_id, peer_id), "punch_request target lookup missed");
        }
        endpoint
    }

    /// Snapshot for `get_rooms`.
    pub fn snapshot(&self) -> HashMap<String, RoomSummary> {
        self.rooms
            .iter()
            .map(|(room_id, room)| {
                (
                    room_id.clone(),
                    RoomSummary {
                        member_count: room.members.len(),
                        created_at: room.created_at_unix_ms,
                    },
                )
            })
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Soft-state expiry tick (spec §4.3). Returns the rooms that were
    /// destroyed as a side effect of every member expiring, for logging.
    /// `peer_left` is deliberately NOT synthesized here (spec §9 open
    /// question, resolved as "no" per SPEC_FULL.md §9).
    pub fn expire_stale(&mut self) -> Vec<String> {
        let now = Instant::now();
        let mut emptied = Vec::new();
        self.rooms.retain(|room_id, room| {
            room.members
                .retain(|_, member| now.duration_since(member.last_seen) <= STALE_THRESHOLD);
            if room.members.is_empty() {
                emptied.push(room_id.clone());
                false
            } else {
                true
            }
        });
        emptied
    }

    #[cfg(test)]
    fn contains_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    #[cfg(test)]
    fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map(|r| r.members.len()).unwrap_or(0)
    }
}

fn not_member(room_id: &str, peer_id: &PeerId) -> ProtocolError {
    ProtocolError::NotMember {
        room_id: room_id.to_string(),
        peer_id: peer_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ep(port: u16) -> Endpoint {
        Endpoint::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    #[test]
    fn room_exists_iff_nonempty() {
        let mut reg = RoomRegistry::new();
        assert!(!reg.contains_room("game-1"));

        reg.join("game-1", "P1".into(), "Alice".into(), ep(1));
        assert!(reg.contains_room("game-1"));

        let outcome = reg.leave("game-1", &"P1".into());
        assert!(outcome.removed);
        assert!(!reg.contains_room("game-1"));
    }

    #[test]
    fn join_roster_excludes_joiner() {
        let mut reg = RoomRegistry::new();
        reg.join("game-1", "P1".into(), "Alice".into(), ep(1));
        let outcome = reg.join("game-1", "P2".into(), "Bob".into(), ep(2));
        assert_eq!(outcome.existing_members.len(), 1);
        assert_eq!(outcome.existing_members[0].peer_id, "P1".into());
        assert_eq!(outcome.notify.len(), 1);
        assert_eq!(outcome.notify[0].peer_id, "P1".into());
    }

    #[test]
    fn leave_unknown_peer_is_idempotent_success() {
        let mut reg = RoomRegistry::new();
        reg.join("game-1", "P1".into(), "Alice".into(), ep(1));
        let outcome = reg.leave("game-1", &"P2".into());
        assert!(!outcome.removed);
        assert!(reg.contains_room("game-1"));
    }

    #[test]
    fn keepalive_on_unknown_peer_is_silent_noop() {
        let mut reg = RoomRegistry::new();
        reg.keepalive("game-1", &"P3".into(), ep(3));
        assert!(!reg.contains_room("game-1"));
    }

    #[test]
    fn reconnect_overwrites_endpoint() {
        let mut reg = RoomRegistry::new();
        reg.join("game-1", "P1".into(), "Alice".into(), ep(1));
        reg.join("game-1", "P1".into(), "Alice".into(), ep(2));
        assert_eq!(reg.member_endpoint("game-1", &"P1".into()), Some(ep(2)));
        assert_eq!(reg.member_count("game-1"), 1);
    }

    #[test]
    fn punch_request_target_lookup_misses_silently() {
        let reg = RoomRegistry::new();
        assert_eq!(reg.member_endpoint("game-1", &"ghost".into()), None);
    }

    #[test]
    fn snapshot_reports_member_counts() {
        let mut reg = RoomRegistry::new();
        reg.join("game-1", "P1".into(), "Alice".into(), ep(1));
        reg.join("game-1", "P2".into(), "Bob".into(), ep(2));
        reg.join("game-2", "P3".into(), "Carol".into(), ep(3));
        let snap = reg.snapshot();
        assert_eq!(snap.get("game-1").unwrap().member_count, 2);
        assert_eq!(snap.get("game-2").unwrap().member_count, 1);
    }
}

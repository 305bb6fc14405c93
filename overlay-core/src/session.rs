//! Client-side session and punching state machine — spec §4.4.

use crate::model::{Endpoint, PeerId, PeerView, Reachability};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// Retry schedule for an unanswered `punch_request` (spec §4.4, §9:
/// the reference does not retry; this implementation does, per the
/// REDESIGN FLAG resolved in SPEC_FULL.md §4.4/§9).
pub const DEFAULT_PUNCH_RETRY_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Interval between keepalives while `in_room` (spec §4.4).
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Idle,
    AwaitingAck,
    InRoom,
}

/// Tracks a peer's outstanding punch attempts so the retry scheduler
/// knows when to re-send and when the schedule is exhausted.
#[derive(Debug, Clone)]
struct PunchState {
    attempts_sent: usize,
    last_sent: Instant,
}

/// Per-process client state (spec §3's `Session`). Session mutation is
/// serialized by the single mutex the packet pump and keepalive ticker
/// share (spec §5); this type itself holds no lock — the caller wraps
/// it in one.
pub struct Session {
    pub own_peer_id: PeerId,
    pub own_username: String,
    pub room_id: Option<String>,
    pub room_state: RoomState,
    members: HashMap<PeerId, PeerView>,
    reachability: HashMap<PeerId, Reachability>,
    punch_state: HashMap<PeerId, PunchState>,
    pub last_keepalive: Instant,
}

impl Session {
    pub fn new(own_peer_id: PeerId, own_username: String) -> Self {
        Self {
            own_peer_id,
            own_username,
            room_id: None,
            room_state: RoomState::Idle,
            members: HashMap::new(),
            reachability: HashMap::new(),
            punch_state: HashMap::new(),
            last_keepalive: Instant::now(),
        }
    }

    pub fn members(&self) -> impl Iterator<Item = &PeerView> {
        self.members.values()
    }

    pub fn member(&self, peer_id: &PeerId) -> Option<&PeerView> {
        self.members.get(peer_id)
    }

    pub fn is_reachable(&self, peer_id: &PeerId) -> bool {
        matches!(self.reachability.get(peer_id), Some(Reachability::Reachable))
    }

    pub fn reachable_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.reachability
            .iter()
            .filter(|(_, r)| matches!(r, Reachability::Reachable))
            .map(|(id, _)| id)
    }

    /// `create_room`/`join_room` issued locally: enters `awaiting_ack`.
    pub fn begin_join(&mut self, room_id: String) {
        self.room_id = Some(room_id);
        self.room_state = RoomState::AwaitingAck;
    }

    /// `room_created`/`room_joined` acknowledged by the server: enters
    /// `in_room` and seeds the member cache from the roster (own id
    /// never appears in it, per spec §3's invariant — the registry
    /// already excludes the joiner, but this guards against a server
    /// bug that includes it anyway).
    pub fn room_joined(&mut self, roster: Vec<PeerView>) {
        self.room_state = RoomState::InRoom;
        self.members.clear();
        for peer in roster {
            if peer.peer_id != self.own_peer_id {
                self.members.insert(peer.peer_id.clone(), peer);
            }
        }
    }

    /// Local `leave_room`: reverts to idle and clears all peer state.
    pub fn leave(&mut self) {
        self.room_id = None;
        self.room_state = RoomState::Idle;
        self.members.clear();
        self.reachability.clear();
        self.punch_state.clear();
    }

    /// `peer_joined` notification: idempotent overwrite (spec §5).
    /// Returns the endpoint a punch should now be initiated toward,
    /// unless this is our own id (can't happen on a correct server,
    /// but guarded defensively).
    pub fn peer_joined(&mut self, peer: PeerView) -> Option<Endpoint> {
        if peer.peer_id == self.own_peer_id {
            return None;
        }
        let endpoint = peer.endpoint;
        let peer_id = peer.peer_id.clone();
        self.members.insert(peer_id.clone(), peer);
        self.reachability.insert(peer_id, Reachability::Punching);
        Some(endpoint)
    }

    /// `peer_left` notification: no-op if the peer is already unknown
    /// (spec §5 idempotence).
    pub fn peer_left(&mut self, peer_id: &PeerId) {
        self.members.remove(peer_id);
        self.reachability.remove(peer_id);
        self.punch_state.remove(peer_id);
    }

    /// We are about to send (or retry) a `punch_request` toward `peer_id`.
    /// Marks it `Punching` if it wasn't already in some further state.
    pub fn begin_punch(&mut self, peer_id: &PeerId) {
        self.reachability
            .entry(peer_id.clone())
            .or_insert(Reachability::Punching);
        self.punch_state.insert(
            peer_id.clone(),
            PunchState {
                attempts_sent: 1,
                last_sent: Instant::now(),
            },
        );
    }

    /// We received a relayed `punch_request` whose `source_peer` is a
    /// known member. Spec §5: receiving a punch request always
    /// triggers a reply regardless of local state, so this never
    /// checks `reachability` — only membership.
    pub fn should_reply_to_punch(&self, source_peer: &PeerId) -> bool {
        self.members.contains_key(source_peer)
    }

    /// We received a `punch_response` from `peer_id`: promote to
    /// reachable unconditionally, even if we weren't in `punching`
    /// (spec §5: "still promotes the peer to reachable").
    pub fn punch_response_received(&mut self, peer_id: &PeerId) {
        self.reachability
            .insert(peer_id.clone(), Reachability::Reachable);
        self.punch_state.remove(peer_id);
    }

    /// Peers still in `punching` whose retry schedule says it's time
    /// to resend, per `schedule`. Advances internal retry bookkeeping
    /// as a side effect; callers should actually send a `punch_request`
    /// for each returned peer immediately after calling this.
    pub fn due_punch_retries(&mut self, schedule: &[Duration]) -> Vec<PeerId> {
        let now = Instant::now();
        let mut due = Vec::new();
        for (peer_id, reach) in self.reachability.iter() {
            if !matches!(reach, Reachability::Punching) {
                continue;
            }
            let Some(state) = self.punch_state.get(peer_id) else {
                continue;
            };
            let Some(next_delay) = schedule.get(state.attempts_sent.saturating_sub(1)) else {
                continue; // schedule exhausted, stays `punching` forever (spec §4.4)
            };
            if now.duration_since(state.last_sent) >= *next_delay {
                due.push(peer_id.clone());
            }
        }
        for peer_id in &due {
            if let Some(state) = self.punch_state.get_mut(peer_id) {
                state.attempts_sent += 1;
                state.last_sent = now;
            }
        }
        due
    }

    pub fn due_keepalive(&self) -> bool {
        matches!(self.room_state, RoomState::InRoom)
            && self.last_keepalive.elapsed() >= KEEPALIVE_INTERVAL
    }

    pub fn mark_keepalive_sent(&mut self) {
        self.last_keepalive = Instant::now();
    }
}

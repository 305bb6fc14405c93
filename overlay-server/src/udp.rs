//! UDP receive-and-dispatch loop — spec §4.3, §6.
//!
//! One bound socket, one registry mutex. Every branch that needs to send
//! a reply builds the message while holding the lock only long enough to
//! read or mutate the registry, then sends after releasing it, so no
//! network await ever happens under the lock (spec §5).

use crate::state::AppState;
use overlay_core::model::Endpoint;
use overlay_core::protocol::{Classification, ControlMessage, RoomListEntry, RosterMember};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const MAX_DATAGRAM: usize = 65536;

pub async fn run(socket: Arc<UdpSocket>, state: Arc<AppState>) -> anyhow::Result<()> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        handle_datagram(&socket, &state, &buf[..len], from).await;
    }
}

/// Periodic soft-state expiry (spec §4.3: every 30s, 60s staleness).
pub async fn run_cleanup(state: Arc<AppState>, period: Duration) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        let emptied = state.registry.lock().await.expire_stale();
        for room_id in emptied {
            info!(%room_id, "room emptied by staleness expiry");
        }
    }
}

async fn handle_datagram(socket: &UdpSocket, state: &Arc<AppState>, payload: &[u8], from: SocketAddr) {
    let msg = match ControlMessage::classify(payload) {
        Classification::Control(msg) => msg,
        Classification::Data(_) => {
            trace!(%from, len = payload.len(), "dropping non-control datagram on control port");
            return;
        }
    };
    let from_endpoint = Endpoint::from(from);

    match msg {
        ControlMessage::CreateRoom { room_id, peer_id, username, .. } => {
            let outcome = {
                let mut reg = state.registry.lock().await;
                reg.join(&room_id, peer_id.clone().into(), username.clone(), from_endpoint)
            };
            let reply = ControlMessage::room_created(room_id.clone(), from_endpoint.ip().to_string(), from_endpoint.port());
            send_to(socket, &reply, from).await;

            let announce = ControlMessage::PeerJoined {
                room_id,
                peer_id,
                username,
                public_ip: from_endpoint.ip().to_string(),
                public_port: from_endpoint.port(),
            };
            for member in outcome.notify {
                send_to(socket, &announce, member.endpoint.socket_addr()).await;
            }
        }
        ControlMessage::JoinRoom { room_id, peer_id, username, .. } => {
            let outcome = {
                let mut reg = state.registry.lock().await;
                reg.join(&room_id, peer_id.clone().into(), username.clone(), from_endpoint)
            };
            let members: HashMap<String, RosterMember> = outcome
                .existing_members
                .iter()
                .map(|m| {
                    (
                        m.peer_id.to_string(),
                        RosterMember {
                            username: m.username.clone(),
                            public_ip: m.endpoint.ip().to_string(),
                            public_port: m.endpoint.port(),
                        },
                    )
                })
                .collect();
            let reply = ControlMessage::RoomJoined {
                room_id: room_id.clone(),
                members,
                status: "success".to_string(),
                public_ip: from_endpoint.ip().to_string(),
                public_port: from_endpoint.port(),
            };
            send_to(socket, &reply, from).await;

            let announce = ControlMessage::PeerJoined {
                room_id,
                peer_id,
                username,
                public_ip: from_endpoint.ip().to_string(),
                public_port: from_endpoint.port(),
            };
            for member in outcome.notify {
                send_to(socket, &announce, member.endpoint.socket_addr()).await;
            }
        }
        ControlMessage::LeaveRoom { room_id, peer_id } => {
            let outcome = {
                let mut reg = state.registry.lock().await;
                reg.leave(&room_id, &peer_id.clone().into())
            };
            if outcome.removed {
                let announce = ControlMessage::PeerLeft { room_id, peer_id };
                for member in outcome.notify {
                    send_to(socket, &announce, member.endpoint.socket_addr()).await;
                }
            }
        }
        ControlMessage::Keepalive { room_id, peer_id } => {
            state
                .registry
                .lock()
                .await
                .keepalive(&room_id, &peer_id.into(), from_endpoint);
        }
        ControlMessage::GetRooms {} => {
            let snapshot = state.registry.lock().await.snapshot();
            let rooms: HashMap<String, RoomListEntry> = snapshot
                .into_iter()
                .map(|(id, summary)| {
                    (
                        id,
                        RoomListEntry {
                            member_count: summary.member_count,
                            created_at: summary.created_at,
                        },
                    )
                })
                .collect();
            send_to(socket, &ControlMessage::RoomList { rooms }, from).await;
        }
        ControlMessage::PunchRequest { room_id, source_peer, target_peer: Some(target_peer), .. } => {
            let target_endpoint = state
                .registry
                .lock()
                .await
                .member_endpoint(&room_id, &target_peer.clone().into());
            match target_endpoint {
                Some(endpoint) => {
                    let relay = ControlMessage::PunchRequest {
                        room_id,
                        source_peer,
                        target_peer: None,
                        source_public_ip: Some(from_endpoint.ip().to_string()),
                        source_public_port: Some(from_endpoint.port()),
                    };
                    send_to(socket, &relay, endpoint.socket_addr()).await;
                }
                None => {
                    warn!(%room_id, target_peer = %target_peer, "punch_request target not in room, dropping");
                }
            }
        }
        other => {
            debug!(?other, %from, "unexpected message on server control port, dropping");
        }
    }
}

async fn send_to(socket: &UdpSocket, msg: &ControlMessage, to: SocketAddr) {
    let bytes = msg.to_bytes();
    if let Err(err) = socket.send_to(&bytes, to).await {
        warn!(%to, %err, "failed to send control reply");
    }
}

//! Packet pump — spec §4.5 — and the client-side control-message
//! dispatch that drives the session state machine (spec §4.4).
//!
//! Two tasks share one [`Session`] behind a [`tokio::sync::Mutex`]
//! (spec §5): [`ClientPump::run`] (UDP + NIC co-scheduling) and
//! [`run_maintenance`] (keepalive cadence + punch retry cadence).
//! Neither holds the mutex across a suspension point.

use crate::model::{Endpoint, PeerId, PeerView};
use crate::observer::{Direction, Observer, PumpEvent};
use crate::protocol::{Classification, ControlMessage, RosterMember};
use crate::session::{DEFAULT_PUNCH_RETRY_SCHEDULE, Session};
use overlay_tun::TunDevice;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{debug, warn};

/// Largest payload the pump will read in one go (spec §4.1: control
/// datagrams fit in a single UDP payload, <= 64 KiB).
const MAX_DATAGRAM: usize = 65536;

pub struct ClientPump {
    socket: Arc<UdpSocket>,
    nic: Option<Arc<dyn TunDevice>>,
    session: Arc<Mutex<Session>>,
    server_addr: SocketAddr,
    observer: Observer,
}

impl ClientPump {
    pub fn new(
        socket: Arc<UdpSocket>,
        nic: Option<Arc<dyn TunDevice>>,
        session: Arc<Mutex<Session>>,
        server_addr: SocketAddr,
        observer: Observer,
    ) -> Self {
        Self {
            socket,
            nic,
            session,
            server_addr,
            observer,
        }
    }

    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }

    pub fn observer(&self) -> Observer {
        self.observer.clone()
    }

    /// Runs until the socket is closed (client shutdown, spec §5) — a
    /// closed-socket `recv_from` error is the only one treated as
    /// terminal. All other UDP send/receive errors are logged and never
    /// abort the loop (spec §7 Transport errors).
    pub async fn run(&self) {
        let mut udp_buf = vec![0u8; MAX_DATAGRAM];
        let mut nic_buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let stop = match &self.nic {
                Some(nic) => {
                    tokio::select! {
                        res = self.socket.recv_from(&mut udp_buf) => {
                            self.handle_udp_readable(res, &udp_buf).await
                        }
                        res = nic.recv_outbound(&mut nic_buf) => {
                            self.handle_nic_readable(res, &nic_buf).await;
                            false
                        }
                    }
                }
                None => {
                    let res = self.socket.recv_from(&mut udp_buf).await;
                    self.handle_udp_readable(res, &udp_buf).await
                }
            };
            if stop {
                break;
            }
        }
    }

    /// Returns `true` when the caller should stop the pump (socket
    /// closed out from under it during shutdown).
    async fn handle_udp_readable(
        &self,
        res: std::io::Result<(usize, SocketAddr)>,
        buf: &[u8],
    ) -> bool {
        let (len, from) = match res {
            Ok(v) => v,
            Err(e) if is_closed(&e) => return true,
            Err(e) => {
                warn!(error = %e, "udp recv_from failed");
                return false;
            }
        };
        let payload = &buf[..len];
        match ControlMessage::classify(payload) {
            Classification::Control(msg) => {
                self.observer.publish(PumpEvent {
                    direction: Direction::NetToNic,
                    len,
                    endpoint: Some(Endpoint::from(from)),
                });
                self.dispatch_control(msg, from).await;
            }
            Classification::Data(data) => {
                if data.is_empty() {
                    return false;
                }
                self.observer.publish(PumpEvent {
                    direction: Direction::NetToNic,
                    len,
                    endpoint: Some(Endpoint::from(from)),
                });
                if let Some(nic) = &self.nic {
                    if let Err(e) = nic.inject_inbound(data).await {
                        warn!(error = %e, "failed to inject inbound packet into NIC");
                    }
                } else {
                    debug!("dropping opaque datagram: NIC unavailable");
                }
            }
        }
        false
    }

    async fn handle_nic_readable(
        &self,
        res: Result<usize, overlay_tun::error::AdapterError>,
        buf: &[u8],
    ) {
        let len = match res {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "nic recv_outbound failed");
                return;
            }
        };
        if len == 0 {
            return;
        }
        let packet = &buf[..len];
        let peers: Vec<(PeerId, Endpoint)> = {
            let session = self.session.lock().await;
            session
                .reachable_peers()
                .filter_map(|peer_id| session.member(peer_id).map(|m| (peer_id.clone(), m.endpoint)))
                .collect()
        };
        self.observer.publish(PumpEvent {
            direction: Direction::NicToNet,
            len,
            endpoint: None,
        });
        for (peer_id, endpoint) in peers {
            if let Err(e) = self.socket.send_to(packet, endpoint.socket_addr()).await {
                warn!(peer = %peer_id, error = %e, "failed to forward packet to peer");
            }
        }
    }

    async fn dispatch_control(&self, msg: ControlMessage, from: SocketAddr) {
        match msg {
            ControlMessage::RoomCreated { .. } => {
                let mut session = self.session.lock().await;
                session.room_joined(Vec::new());
                debug!("room created, now in_room");
            }
            ControlMessage::RoomJoined { members, .. } => {
                let roster = roster_to_views(members);
                let to_punch: Vec<PeerId> = {
                    let mut session = self.session.lock().await;
                    session.room_joined(roster);
                    let peer_ids: Vec<PeerId> = session.members().map(|m| m.peer_id.clone()).collect();
                    for peer_id in &peer_ids {
                        session.begin_punch(peer_id);
                    }
                    peer_ids
                };
                for peer_id in to_punch {
                    self.send_punch_request(&peer_id).await;
                }
            }
            ControlMessage::PeerJoined {
                peer_id,
                username,
                public_ip,
                public_port,
                ..
            } => {
                let endpoint = resolve_endpoint(&public_ip, public_port, from);
                let peer_id: PeerId = peer_id.into();
                let view = PeerView {
                    peer_id: peer_id.clone(),
                    username,
                    endpoint,
                };
                let should_punch = {
                    let mut session = self.session.lock().await;
                    let result = session.peer_joined(view);
                    if result.is_some() {
                        session.begin_punch(&peer_id);
                    }
                    result
                };
                if should_punch.is_some() {
                    self.send_punch_request(&peer_id).await;
                }
            }
            ControlMessage::PeerLeft { peer_id, .. } => {
                let mut session = self.session.lock().await;
                session.peer_left(&peer_id.into());
            }
            ControlMessage::PunchRequest { source_peer, .. } => {
                let source_peer_id: PeerId = source_peer.into();
                let reply: Option<(ControlMessage, Endpoint)> = {
                    let session = self.session.lock().await;
                    if session.should_reply_to_punch(&source_peer_id) {
                        session.member(&source_peer_id).map(|m| {
                            (
                                ControlMessage::PunchResponse {
                                    room_id: session.room_id.clone().unwrap_or_default(),
                                    peer_id: session.own_peer_id.to_string(),
                                },
                                m.endpoint,
                            )
                        })
                    } else {
                        None
                    }
                };
                match reply {
                    Some((msg, endpoint)) => self.send_direct(&msg, endpoint.socket_addr()).await,
                    None => debug!(peer = %source_peer_id, "punch_request from unknown source, dropping"),
                }
            }
            ControlMessage::PunchResponse { peer_id, .. } => {
                let mut session = self.session.lock().await;
                session.punch_response_received(&peer_id.into());
            }
            ControlMessage::RoomList { .. } => {
                debug!("received room_list");
            }
            other => {
                debug!(?other, "control message not expected on client, ignoring");
            }
        }
    }

    async fn send_punch_request(&self, target_peer: &PeerId) {
        let room_id = {
            let session = self.session.lock().await;
            session.room_id.clone().unwrap_or_default()
        };
        let source_peer = {
            let session = self.session.lock().await;
            session.own_peer_id.to_string()
        };
        let msg = ControlMessage::PunchRequest {
            room_id,
            source_peer,
            target_peer: Some(target_peer.to_string()),
            source_public_ip: None,
            source_public_port: None,
        };
        self.send_to_server(&msg).await;
    }

    async fn send_to_server(&self, msg: &ControlMessage) {
        self.send_direct(msg, self.server_addr).await;
    }

    async fn send_direct(&self, msg: &ControlMessage, addr: SocketAddr) {
        let bytes = msg.to_bytes();
        if let Err(e) = self.socket.send_to(&bytes, addr).await {
            warn!(%addr, error = %e, "failed to send control message");
        }
    }
}

/// Whether a `recv_from` error indicates the socket was closed out from
/// under the pump (client shutdown, spec §5) rather than a transient
/// transport error that should just be logged and ignored.
fn is_closed(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::InvalidInput
    )
}

fn roster_to_views(members: HashMap<String, RosterMember>) -> Vec<PeerView> {
    members
        .into_iter()
        .map(|(peer_id, info)| {
            let endpoint = parse_endpoint(&info.public_ip, info.public_port)
                .unwrap_or_else(|| Endpoint::new(std::net::IpAddr::from([0, 0, 0, 0]), 0));
            PeerView {
                peer_id: peer_id.into(),
                username: info.username,
                endpoint,
            }
        })
        .collect()
}

/// Endpoint selection rule (spec §4.4): prefer the explicit
/// `public_ip`/`public_port` fields; fall back to the datagram's
/// source address only when they're absent (older/simpler servers).
fn resolve_endpoint(public_ip: &str, public_port: u16, fallback: SocketAddr) -> Endpoint {
    parse_endpoint(public_ip, public_port).unwrap_or_else(|| Endpoint::from(fallback))
}

fn parse_endpoint(ip: &str, port: u16) -> Option<Endpoint> {
    if ip.is_empty() || port == 0 {
        return None;
    }
    ip.parse().ok().map(|addr| Endpoint::new(addr, port))
}

/// Retry cadence task: resends `punch_request` for peers still
/// `punching` per the schedule, and sends `keepalive` every 30s while
/// `in_room` (spec §4.4). Ticks at 1s resolution, which is fine-grained
/// enough for both cadences without a dedicated task per concern.
pub async fn run_maintenance(
    socket: Arc<UdpSocket>,
    session: Arc<Mutex<Session>>,
    server_addr: SocketAddr,
    punch_retry_schedule: Vec<Duration>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;

        let (due_keepalive, room_id, own_peer_id, due_retries) = {
            let mut session = session.lock().await;
            let due_keepalive = session.due_keepalive();
            if due_keepalive {
                session.mark_keepalive_sent();
            }
            let due_retries = session.due_punch_retries(&punch_retry_schedule);
            (
                due_keepalive,
                session.room_id.clone(),
                session.own_peer_id.to_string(),
                due_retries,
            )
        };

        if due_keepalive {
            if let Some(room_id) = &room_id {
                let msg = ControlMessage::Keepalive {
                    room_id: room_id.clone(),
                    peer_id: own_peer_id.clone(),
                };
                let bytes = msg.to_bytes();
                if let Err(e) = socket.send_to(&bytes, server_addr).await {
                    warn!(error = %e, "failed to send keepalive");
                }
            }
        }

        for peer_id in due_retries {
            let Some(room_id) = room_id.clone() else {
                continue;
            };
            let msg = ControlMessage::PunchRequest {
                room_id,
                source_peer: own_peer_id.clone(),
                target_peer: Some(peer_id.to_string()),
                source_public_ip: None,
                source_public_port: None,
            };
            let bytes = msg.to_bytes();
            if let Err(e) = socket.send_to(&bytes, server_addr).await {
                warn!(peer = %peer_id, error = %e, "failed to resend punch_request");
            }
        }
    }
}

pub fn default_punch_retry_schedule() -> Vec<Duration> {
    DEFAULT_PUNCH_RETRY_SCHEDULE.to_vec()
}

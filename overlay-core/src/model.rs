//! Core data model shared by the registry (server) and session (client).
//!
//! See spec §3. Kept free of I/O so both `overlay-server` and
//! `overlay-client` can depend on it without pulling in sockets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Opaque client-generated identifier, unique within a process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        PeerId(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId(s.to_string())
    }
}

/// The (IP, UDP port) pair a peer is reachable at, as observed on the
/// wire. Wraps `SocketAddr`; the wire codec flattens this into sibling
/// `public_ip`/`public_port` fields rather than nesting it, to match
/// the field layout the original server and client exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(pub SocketAddr);

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Endpoint(SocketAddr::new(ip, port))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A room member as tracked by the server's registry.
#[derive(Debug, Clone)]
pub struct Member {
    pub peer_id: PeerId,
    pub username: String,
    pub endpoint: Endpoint,
    pub last_seen: Instant,
}

/// A room member as cached by a client from `room_joined`/`peer_joined`.
#[derive(Debug, Clone)]
pub struct PeerView {
    pub peer_id: PeerId,
    pub username: String,
    pub endpoint: Endpoint,
}

/// Per-peer reachability, §4.4. Monotonically re-established on every
/// successful punch exchange, torn down only on `peer_left`/room leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Unknown,
    Punching,
    Reachable,
}

/// Unix-epoch milliseconds, used only in wire payloads (`created_at`,
/// `last_seen` on the health endpoint) — never for internal scheduling,
/// which uses `tokio::time::Instant` so tests can advance a paused clock.
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSummary {
    pub member_count: usize,
    pub created_at: u64,
}

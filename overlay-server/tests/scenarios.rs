//! Rendezvous server scenarios driven over real loopback UDP sockets
//! against the live dispatch loop.

use overlay_core::protocol::ControlMessage;
use overlay_core::registry::{CLEANUP_PERIOD, STALE_THRESHOLD};
use overlay_server::state::AppState;
use overlay_server::udp;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
    let socket = Arc::new(UdpSocket::bind(loopback(0)).await.unwrap());
    let addr = socket.local_addr().unwrap();
    let state = AppState::new("127.0.0.1".to_string());
    tokio::spawn(udp::run(socket, state.clone()));
    (addr, state)
}

async fn recv_message(socket: &UdpSocket) -> ControlMessage {
    let mut buf = vec![0u8; 65536];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();
    match ControlMessage::classify(&buf[..len]) {
        overlay_core::protocol::Classification::Control(msg) => msg,
        overlay_core::protocol::Classification::Data(_) => panic!("expected a control message"),
    }
}

async fn send(socket: &UdpSocket, to: SocketAddr, msg: &ControlMessage) {
    socket.send_to(&msg.to_bytes(), to).await.unwrap();
}

#[tokio::test]
async fn two_peers_join_and_see_each_others_roster() {
    let (server_addr, _state) = spawn_server().await;
    let alice = UdpSocket::bind(loopback(0)).await.unwrap();
    let bob = UdpSocket::bind(loopback(0)).await.unwrap();

    send(
        &alice,
        server_addr,
        &ControlMessage::CreateRoom {
            room_id: "game-1".into(),
            peer_id: "A".into(),
            username: "Alice".into(),
            port: 0,
        },
    )
    .await;
    let reply = recv_message(&alice).await;
    assert!(matches!(reply, ControlMessage::RoomCreated { status, .. } if status == "success"));

    send(
        &bob,
        server_addr,
        &ControlMessage::JoinRoom {
            room_id: "game-1".into(),
            peer_id: "B".into(),
            username: "Bob".into(),
            port: 0,
        },
    )
    .await;
    let reply = recv_message(&bob).await;
    match reply {
        ControlMessage::RoomJoined { members, status, .. } => {
            assert_eq!(status, "success");
            assert!(members.contains_key("A"));
            assert_eq!(members.len(), 1);
        }
        other => panic!("expected room_joined, got {other:?}"),
    }

    let announce = recv_message(&alice).await;
    assert!(matches!(announce, ControlMessage::PeerJoined { peer_id, .. } if peer_id == "B"));
}

#[tokio::test]
async fn keepalive_from_unknown_peer_is_silently_dropped() {
    let (server_addr, state) = spawn_server().await;
    let client = UdpSocket::bind(loopback(0)).await.unwrap();

    send(
        &client,
        server_addr,
        &ControlMessage::Keepalive {
            room_id: "ghost-room".into(),
            peer_id: "ghost".into(),
        },
    )
    .await;

    // No reply should ever arrive, and no room should have been created.
    let mut buf = [0u8; 64];
    let result = tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
    assert!(result.is_err(), "server must not reply to a keepalive");
    assert_eq!(state.registry.lock().await.room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_member_is_expired_after_cleanup_tick() {
    let (server_addr, state) = spawn_server().await;
    tokio::spawn(udp::run_cleanup(state.clone(), CLEANUP_PERIOD));
    let client = UdpSocket::bind(loopback(0)).await.unwrap();

    send(
        &client,
        server_addr,
        &ControlMessage::CreateRoom {
            room_id: "game-1".into(),
            peer_id: "A".into(),
            username: "Alice".into(),
            port: 0,
        },
    )
    .await;
    let _ = recv_message(&client).await;
    assert_eq!(state.registry.lock().await.room_count(), 1);

    tokio::time::advance(STALE_THRESHOLD + CLEANUP_PERIOD + Duration::from_secs(1)).await;
    tokio::task::yield_now().await;

    assert_eq!(state.registry.lock().await.room_count(), 0);
}

#[tokio::test]
async fn third_peer_join_announces_to_both_existing_members() {
    let (server_addr, _state) = spawn_server().await;
    let alice = UdpSocket::bind(loopback(0)).await.unwrap();
    let bob = UdpSocket::bind(loopback(0)).await.unwrap();
    let carol = UdpSocket::bind(loopback(0)).await.unwrap();

    send(
        &alice,
        server_addr,
        &ControlMessage::CreateRoom {
            room_id: "game-1".into(),
            peer_id: "A".into(),
            username: "Alice".into(),
            port: 0,
        },
    )
    .await;
    recv_message(&alice).await;

    send(
        &bob,
        server_addr,
        &ControlMessage::JoinRoom {
            room_id: "game-1".into(),
            peer_id: "B".into(),
            username: "Bob".into(),
            port: 0,
        },
    )
    .await;
    recv_message(&bob).await;
    recv_message(&alice).await; // peer_joined for B

    send(
        &carol,
        server_addr,
        &ControlMessage::JoinRoom {
            room_id: "game-1".into(),
            peer_id: "C".into(),
            username: "Carol".into(),
            port: 0,
        },
    )
    .await;
    let joined = recv_message(&carol).await;
    assert!(matches!(joined, ControlMessage::RoomJoined { members, .. } if members.len() == 2));

    let announce_a = recv_message(&alice).await;
    assert!(matches!(announce_a, ControlMessage::PeerJoined { peer_id, .. } if peer_id == "C"));
    let announce_b = recv_message(&bob).await;
    assert!(matches!(announce_b, ControlMessage::PeerJoined { peer_id, .. } if peer_id == "C"));
}

#[tokio::test]
async fn punch_request_relays_to_target_with_source_endpoint_attached() {
    let (server_addr, _state) = spawn_server().await;
    let alice = UdpSocket::bind(loopback(0)).await.unwrap();
    let bob = UdpSocket::bind(loopback(0)).await.unwrap();

    send(
        &alice,
        server_addr,
        &ControlMessage::CreateRoom {
            room_id: "game-1".into(),
            peer_id: "A".into(),
            username: "Alice".into(),
            port: 0,
        },
    )
    .await;
    recv_message(&alice).await;

    send(
        &bob,
        server_addr,
        &ControlMessage::JoinRoom {
            room_id: "game-1".into(),
            peer_id: "B".into(),
            username: "Bob".into(),
            port: 0,
        },
    )
    .await;
    recv_message(&bob).await;
    recv_message(&alice).await; // peer_joined for B

    let bob_addr = bob.local_addr().unwrap();
    send(
        &bob,
        server_addr,
        &ControlMessage::PunchRequest {
            room_id: "game-1".into(),
            source_peer: "B".into(),
            target_peer: Some("A".into()),
            source_public_ip: None,
            source_public_port: None,
        },
    )
    .await;

    let relayed = recv_message(&alice).await;
    match relayed {
        ControlMessage::PunchRequest {
            source_peer,
            target_peer,
            source_public_ip,
            source_public_port,
            ..
        } => {
            assert_eq!(source_peer, "B");
            assert!(target_peer.is_none(), "relayed form drops target_peer");
            assert_eq!(source_public_ip, Some(bob_addr.ip().to_string()));
            assert_eq!(source_public_port, Some(bob_addr.port()));
        }
        other => panic!("expected relayed punch_request, got {other:?}"),
    }
}

#[tokio::test]
async fn punch_request_for_unknown_target_is_dropped_silently() {
    let (server_addr, _state) = spawn_server().await;
    let alice = UdpSocket::bind(loopback(0)).await.unwrap();

    send(
        &alice,
        server_addr,
        &ControlMessage::CreateRoom {
            room_id: "game-1".into(),
            peer_id: "A".into(),
            username: "Alice".into(),
            port: 0,
        },
    )
    .await;
    recv_message(&alice).await;

    send(
        &alice,
        server_addr,
        &ControlMessage::PunchRequest {
            room_id: "game-1".into(),
            source_peer: "A".into(),
            target_peer: Some("ghost".into()),
            source_public_ip: None,
            source_public_port: None,
        },
    )
    .await;

    let mut buf = [0u8; 64];
    let result = tokio::time::timeout(Duration::from_millis(200), alice.recv_from(&mut buf)).await;
    assert!(result.is_err(), "server must not reply when punch target is unknown");
}

#[tokio::test]
async fn garbage_binary_payload_gets_no_reply_and_no_state_change() {
    let (server_addr, state) = spawn_server().await;
    let client = UdpSocket::bind(loopback(0)).await.unwrap();

    let garbage: Vec<u8> = (0u8..=255).collect();
    client.send_to(&garbage, server_addr).await.unwrap();

    let mut buf = [0u8; 64];
    let result = tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
    assert!(result.is_err(), "server must not reply to an unrecognized payload");
    assert_eq!(state.registry.lock().await.room_count(), 0);
}

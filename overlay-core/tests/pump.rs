//! Opaque data-packet delivery through the client pump (scenario: an
//! unrecognized binary payload is handed to the NIC byte-for-byte, and a
//! NIC-sourced packet is forwarded verbatim to every reachable peer).

use overlay_core::model::{Endpoint, PeerId, PeerView};
use overlay_core::observer::Observer;
use overlay_core::pump::ClientPump;
use overlay_core::session::Session;
use overlay_tun::fake::pair;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

#[tokio::test]
async fn inbound_opaque_datagram_is_injected_into_nic_unchanged() {
    let client_socket = Arc::new(UdpSocket::bind(loopback(0)).await.unwrap());
    let client_addr = client_socket.local_addr().unwrap();
    let peer_socket = UdpSocket::bind(loopback(0)).await.unwrap();

    let (fake_nic, mut handle) = pair();
    let session = Arc::new(Mutex::new(Session::new(PeerId::from("A"), "Alice".into())));
    let pump = ClientPump::new(
        client_socket.clone(),
        Some(Arc::new(fake_nic)),
        session,
        loopback(1),
        Observer::default(),
    );

    let run_handle = tokio::spawn(async move {
        pump.run().await;
    });

    let payload = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02];
    peer_socket.send_to(&payload, client_addr).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), handle.inbound_rx.recv())
        .await
        .expect("timed out waiting for injected packet")
        .expect("channel closed");
    assert_eq!(received, payload);

    run_handle.abort();
}

#[tokio::test]
async fn outbound_nic_packet_is_forwarded_to_every_reachable_peer() {
    let client_socket = Arc::new(UdpSocket::bind(loopback(0)).await.unwrap());
    let peer_a = UdpSocket::bind(loopback(0)).await.unwrap();
    let peer_b = UdpSocket::bind(loopback(0)).await.unwrap();
    let peer_a_addr = peer_a.local_addr().unwrap();
    let peer_b_addr = peer_b.local_addr().unwrap();

    let (fake_nic, handle) = pair();
    let session = Arc::new(Mutex::new(Session::new(PeerId::from("A"), "Alice".into())));
    {
        let mut s = session.lock().await;
        s.begin_join("game-1".into());
        s.room_joined(vec![
            PeerView {
                peer_id: "B".into(),
                username: "Bob".into(),
                endpoint: Endpoint::from(peer_a_addr),
            },
            PeerView {
                peer_id: "C".into(),
                username: "Carol".into(),
                endpoint: Endpoint::from(peer_b_addr),
            },
        ]);
        s.punch_response_received(&"B".into());
        s.punch_response_received(&"C".into());
    }

    let pump = ClientPump::new(
        client_socket,
        Some(Arc::new(fake_nic)),
        session,
        loopback(1),
        Observer::default(),
    );
    let run_handle = tokio::spawn(async move {
        pump.run().await;
    });

    let packet = vec![1, 2, 3, 4, 5];
    handle.outbound_tx.send(packet.clone()).await.unwrap();

    let mut buf = [0u8; 1500];
    let (len_a, _) = tokio::time::timeout(Duration::from_secs(2), peer_a.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..len_a], packet.as_slice());

    let mut buf2 = [0u8; 1500];
    let (len_b, _) = tokio::time::timeout(Duration::from_secs(2), peer_b.recv_from(&mut buf2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf2[..len_b], packet.as_slice());

    run_handle.abort();
}

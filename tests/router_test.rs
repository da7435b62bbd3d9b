// author: kodeholic (powered by Claude)
// ConnectionRouter 통합 테스트: 루프백 UDP 위에서 실제 DTLS 핸드셰이크
//
// 라우터 2개(서버/클라이언트)는 각자 UdpTransport 를 소유하고,
// 원시 피어가 필요한 경우에는 tokio UdpSocket 을 직접 씁니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use mini_rtcmux::stun::attribute::{ATTR_ERROR_CODE, ATTR_XOR_MAPPED_ADDRESS};
use mini_rtcmux::stun::message::{BINDING_ERROR, BINDING_SUCCESS};
use mini_rtcmux::stun::{binding_request, StunMessage, TransactionId};
use mini_rtcmux::{ConnectionRouter, MuxError, RouterConfig, UdpTransport};
use mini_rtcmux::mux::{Role, SessionState};

const WAIT: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// [테스트 헬퍼]
// ----------------------------------------------------------------------------

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn spawn_router(config: RouterConfig) -> (Arc<ConnectionRouter>, Arc<UdpTransport>) {
    let transport = UdpTransport::bind(loopback()).await.unwrap();
    let router    = Arc::new(ConnectionRouter::new(config));
    router.start(Arc::clone(&transport)).unwrap();
    (router, transport)
}

async fn raw_peer() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind(loopback()).await.unwrap();
    let addr   = socket.local_addr().unwrap();
    (socket, addr)
}

async fn recv_from(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 1500];
    let (n, _) = timeout(WAIT, socket.recv_from(&mut buf)).await.expect("응답 없음").unwrap();
    buf.truncate(n);
    buf
}

/// 수신 루프가 데이터그램을 처리할 시간
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// ----------------------------------------------------------------------------
// [DTLS]
// ----------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dtls_echo_between_two_routers() {
    let (server, server_udp) = spawn_router(RouterConfig::default()).await;
    let (client, client_udp) = spawn_router(RouterConfig { answer_stun: false, ..RouterConfig::default() }).await;
    let server_addr = server_udp.local_addr();
    let client_addr = client_udp.local_addr();

    let acceptor = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.accept().await })
    };

    let outbound = timeout(WAIT, client.connect(server_addr)).await.unwrap().unwrap();
    let inbound  = timeout(WAIT, acceptor).await.unwrap().unwrap().unwrap();

    assert_eq!(outbound.role(), Role::Client);
    assert_eq!(inbound.role(), Role::Server);
    assert_eq!(outbound.state(), SessionState::Established);
    assert_eq!(inbound.remote_addr(), client_addr);
    assert_eq!(outbound.remote_addr(), server_addr);

    // 상호 인증서 교환
    assert_eq!(outbound.remote_certificate(), Some(server.local_certificate().unwrap().as_slice()));
    assert_eq!(inbound.remote_certificate(), Some(client.local_certificate().unwrap().as_slice()));

    outbound.write(b"hello over dtls").await.unwrap();
    let got = timeout(WAIT, inbound.read()).await.unwrap().unwrap();
    assert_eq!(got, b"hello over dtls");

    inbound.write(&got).await.unwrap();
    let echoed = timeout(WAIT, outbound.read()).await.unwrap().unwrap();
    assert_eq!(echoed, b"hello over dtls");

    // 같은 주소로 두 번째 연결은 거절
    assert!(matches!(client.connect(server_addr).await, Err(MuxError::AlreadyEstablished(a)) if a == server_addr));

    assert_eq!(server.established_count(), 1);
    outbound.close().await.unwrap();
    outbound.close().await.unwrap();
    assert_eq!(outbound.state(), SessionState::Closed);
    assert!(matches!(outbound.write(b"late").await, Err(MuxError::Closed)));
    assert_eq!(client.established_count(), 0);

    drop(inbound);
    assert_eq!(server.established_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_handshake_does_not_stop_accept() {
    let (server, server_udp) = spawn_router(RouterConfig {
        handshake_timeout_ms: 500,
        ..RouterConfig::default()
    }).await;
    let server_addr = server_udp.local_addr();

    // DTLS 범위 첫 바이트 + 쓰레기 본문
    let (garbage, _) = raw_peer().await;
    garbage.send_to(&[0x16, 0xfe, 0xfd, 0x00, 0x01, 0x02], server_addr).await.unwrap();
    settle().await;
    assert_eq!(server.pending_count(), 1);

    let acceptor = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.accept().await })
    };

    let (client, _client_udp) = spawn_router(RouterConfig { answer_stun: false, ..RouterConfig::default() }).await;
    let outbound = timeout(WAIT, client.connect(server_addr)).await.unwrap().unwrap();
    let inbound  = timeout(WAIT, acceptor).await.unwrap().unwrap().unwrap();

    assert_eq!(inbound.remote_addr(), client.local_addr().unwrap());
    assert_eq!(outbound.state(), SessionState::Established);
    assert_eq!(server.established_count(), 1);
}

// ----------------------------------------------------------------------------
// [pending 테이블]
// ----------------------------------------------------------------------------

#[tokio::test]
async fn later_datagram_replaces_pending_entry() {
    let (server, server_udp) = spawn_router(RouterConfig::default()).await;
    let (peer, peer_addr) = raw_peer().await;

    peer.send_to(&[0x16, 0x01], server_udp.local_addr()).await.unwrap();
    peer.send_to(&[0x16, 0x02], server_udp.local_addr()).await.unwrap();
    settle().await;

    assert_eq!(server.pending_count(), 1);
    assert_eq!(server.pending_datagram(&peer_addr), Some(vec![0x16, 0x02]));
    assert_eq!(server.established_count(), 0);
}

// ----------------------------------------------------------------------------
// [STUN]
// ----------------------------------------------------------------------------

#[tokio::test]
async fn stun_binding_is_answered_in_place() {
    let (server, server_udp) = spawn_router(RouterConfig::default()).await;
    let (peer, peer_addr) = raw_peer().await;

    let txid = TransactionId::random();
    peer.send_to(&binding_request(txid, Some("a:b"), None).unwrap(), server_udp.local_addr()).await.unwrap();

    let resp = StunMessage::decode(&recv_from(&peer).await).unwrap();
    assert_eq!(resp.msg_type, BINDING_SUCCESS);
    assert_eq!(resp.transaction_id, txid);
    let mapped = resp.get(ATTR_XOR_MAPPED_ADDRESS).unwrap().as_xor_mapped_address(&txid).unwrap();
    assert_eq!(mapped, peer_addr);

    // STUN 은 pending 으로 가지 않음
    assert_eq!(server.pending_count(), 0);
}

#[tokio::test]
async fn stun_binding_with_wrong_password_gets_401() {
    let (_server, server_udp) = spawn_router(RouterConfig {
        stun_password: Some("server-pwd".into()),
        ..RouterConfig::default()
    }).await;
    let (peer, _) = raw_peer().await;

    let txid = TransactionId::random();
    let request = binding_request(txid, Some("a:b"), Some("guess")).unwrap();
    peer.send_to(&request, server_udp.local_addr()).await.unwrap();

    let resp = StunMessage::decode(&recv_from(&peer).await).unwrap();
    assert_eq!(resp.msg_type, BINDING_ERROR);
    let (code, _) = resp.get(ATTR_ERROR_CODE).unwrap().error_code().unwrap();
    assert_eq!(code, 401);
}

// ----------------------------------------------------------------------------
// [수명 관리]
// ----------------------------------------------------------------------------

#[tokio::test]
async fn stop_is_idempotent_and_ends_accept() {
    let (server, _udp) = spawn_router(RouterConfig::default()).await;
    assert!(server.is_started());

    let acceptor = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.accept().await })
    };
    settle().await;

    server.stop();
    server.stop();
    assert!(!server.is_started());

    let result = timeout(WAIT, acceptor).await.unwrap().unwrap();
    assert!(matches!(result, Err(MuxError::Stopped)));
    assert!(matches!(server.accept().await, Err(MuxError::Stopped)));
}

#[tokio::test]
async fn restart_keeps_certificate() {
    let (server, udp) = spawn_router(RouterConfig::default()).await;
    let first = server.local_certificate().unwrap();
    let fingerprint = server.local_fingerprint().unwrap();

    server.start(Arc::clone(&udp)).unwrap();
    assert_eq!(server.local_certificate().unwrap(), first);

    server.stop();
    server.start(Arc::clone(&udp)).unwrap();
    assert_eq!(server.local_certificate().unwrap(), first);
    assert_eq!(server.local_fingerprint().unwrap(), fingerprint);
    assert_eq!(server.local_addr().unwrap(), udp.local_addr());
}

#[tokio::test]
async fn connect_before_start_is_rejected() {
    let router = ConnectionRouter::new(RouterConfig::default());
    let target: SocketAddr = "127.0.0.1:9".parse().unwrap();
    assert!(matches!(router.connect(target).await, Err(MuxError::NotStarted)));
}

// author: kodeholic (powered by Claude)
// ConnectionRouter: 공유 UDP 소켓 1개를 원격 주소별 DTLS 세션으로 분배
//
// 수신 루프 흐름:
//   transport.read() → UdpPacket { payload, remote_addr }
//     → 패킷 타입 판별 (STUN / DTLS / 기타)
//     → STUN  : Binding Request 면 그 자리에서 응답 (answer_stun)
//     → 그 외 : 확립된 세션이면 inbound 큐로, 아니면 pending 테이블 (덮어쓰기)
//
// accept() : pending 엔트리 클레임 → 세션 즉시 등록 → 서버 핸드셰이크
//            실패하면 등록 해제 후 다음 엔트리로 (리스너는 멈추지 않음)
// connect(): 주소 등록 → 클라이언트 핸드셰이크

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::{RouterConfig, CERT_SUBJECT};
use crate::error::{MuxError, MuxResult};
use crate::mux::cert::ServerCert;
use crate::mux::net::{UdpPacket, UdpTransport};
use crate::mux::pending::PendingInsert;
use crate::mux::registry::{Routed, SessionRegistry};
use crate::mux::session::{DtlsSession, HandshakeContext, Role};
use crate::stun::answer_binding;

// ----------------------------------------------------------------------------
// [패킷 타입 판별]
//
// RFC 7983 §7 demultiplexing:
//   [0,   3]  → STUN
//   [20,  63] → DTLS
//   그 외     → Other (DTLS 와 같은 경로로 라우팅)
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Stun,
    Dtls,
    Other,
}

#[inline]
pub fn classify(buf: &[u8]) -> PacketKind {
    match buf.first() {
        Some(b) if *b <= 3              => PacketKind::Stun,
        Some(b) if *b >= 20 && *b <= 63 => PacketKind::Dtls,
        _                               => PacketKind::Other,
    }
}

// ----------------------------------------------------------------------------
// [ConnectionRouter]
// ----------------------------------------------------------------------------

/// start() 이후 유지되는 자원: stop() 후에도 세션 송신용으로 남음
struct Bound {
    transport: Arc<UdpTransport>,
    cert:      Arc<ServerCert>,
}

pub struct ConnectionRouter {
    config:    RouterConfig,
    registry:  Arc<SessionRegistry>,
    bound:     Mutex<Option<Bound>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionRouter {
    pub fn new(config: RouterConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.pending_capacity));
        Self {
            config,
            registry,
            bound:     Mutex::new(None),
            recv_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// 인증서 생성 + 수신 루프 시작. 두 번째 호출은 경고 후 무시
    pub fn start(&self, transport: Arc<UdpTransport>) -> MuxResult<()> {
        let mut recv_task = self.recv_task.lock().unwrap();
        if recv_task.as_ref().is_some_and(|t| !t.is_finished()) {
            warn!("[router] start called while already running, ignoring");
            return Ok(());
        }

        let mut bound = self.bound.lock().unwrap();
        let cert = match bound.as_ref() {
            // stop() 후 재시작: 같은 신원 유지
            Some(b) => Arc::clone(&b.cert),
            None    => Arc::new(ServerCert::generate(CERT_SUBJECT)?),
        };

        *recv_task = Some(tokio::spawn(run_receive_loop(
            Arc::clone(&transport),
            Arc::clone(&self.registry),
            self.config.clone(),
        )));
        info!("[router] started on {} fingerprint={:.47}...", transport.local_addr(), cert.fingerprint);
        *bound = Some(Bound { transport, cert });
        Ok(())
    }

    /// 수신 루프만 취소: 확립된 세션은 그대로
    pub fn stop(&self) {
        match self.recv_task.lock().unwrap().take() {
            Some(task) => {
                task.abort();
                info!("[router] stopped");
            }
            None => debug!("[router] stop called while not running"),
        }
        self.registry.wake_all();
    }

    /// 수신 루프가 살아 있는지. transport 가 닫혀 루프가 끝났으면 false
    pub fn is_started(&self) -> bool {
        self.recv_task.lock().unwrap()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// 다음 피어와의 서버 핸드셰이크가 성공할 때까지 대기
    pub async fn accept(&self) -> MuxResult<DtlsSession> {
        loop {
            if let Some((remote_addr, inbound)) = self.registry.claim() {
                let (transport, cert) = self.bound_parts()?;
                info!("[router] handshake start addr={}", remote_addr);

                let ctx = HandshakeContext {
                    transport,
                    cert:       &cert,
                    registry:   Arc::clone(&self.registry),
                    timeout_ms: self.config.handshake_timeout_ms,
                };
                match DtlsSession::handshake(ctx, remote_addr, inbound, Role::Server).await {
                    Ok(session) => return Ok(session),
                    Err(e) => {
                        self.registry.remove(&remote_addr);
                        warn!("[router] handshake failed addr={}: {}", remote_addr, e);
                        continue;
                    }
                }
            }

            if let Some(e) = self.halt_reason() {
                return Err(e);
            }
            self.registry.wait_pending().await;
        }
    }

    /// 능동 연결: 같은 소켓에서 클라이언트 역할로 핸드셰이크
    pub async fn connect(&self, remote_addr: SocketAddr) -> MuxResult<DtlsSession> {
        if let Some(e) = self.halt_reason() {
            return Err(e);
        }
        let (transport, cert) = self.bound_parts()?;
        let inbound = self.registry.register(remote_addr)?;
        info!("[router] dialing addr={}", remote_addr);

        let ctx = HandshakeContext {
            transport,
            cert:       &cert,
            registry:   Arc::clone(&self.registry),
            timeout_ms: self.config.handshake_timeout_ms,
        };
        match DtlsSession::handshake(ctx, remote_addr, inbound, Role::Client).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.registry.remove(&remote_addr);
                warn!("[router] dial failed addr={}: {}", remote_addr, e);
                Err(e)
            }
        }
    }

    /// start() 에서 생성한 자체서명 인증서 DER
    pub fn local_certificate(&self) -> MuxResult<Vec<u8>> {
        self.bound.lock().unwrap()
            .as_ref()
            .map(|b| b.cert.der.clone())
            .ok_or(MuxError::NotStarted)
    }

    pub fn local_fingerprint(&self) -> MuxResult<String> {
        self.bound.lock().unwrap()
            .as_ref()
            .map(|b| b.cert.fingerprint.clone())
            .ok_or(MuxError::NotStarted)
    }

    pub fn local_addr(&self) -> MuxResult<SocketAddr> {
        self.bound.lock().unwrap()
            .as_ref()
            .map(|b| b.transport.local_addr())
            .ok_or(MuxError::NotStarted)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    pub fn pending_datagram(&self, remote_addr: &SocketAddr) -> Option<Vec<u8>> {
        self.registry.pending_datagram(remote_addr)
    }

    pub fn established_count(&self) -> usize {
        self.registry.established_count()
    }

    fn bound_parts(&self) -> MuxResult<(Arc<UdpTransport>, Arc<ServerCert>)> {
        self.bound.lock().unwrap()
            .as_ref()
            .map(|b| (Arc::clone(&b.transport), Arc::clone(&b.cert)))
            .ok_or(MuxError::NotStarted)
    }

    /// accept/connect 를 진행할 수 없는 이유. 진행 가능하면 None
    fn halt_reason(&self) -> Option<MuxError> {
        // recv_task → bound 순서 (start 와 동일)
        let started = self.is_started();
        let bound   = self.bound.lock().unwrap();
        match bound.as_ref() {
            None                                => Some(MuxError::NotStarted),
            Some(b) if b.transport.is_closed()  => Some(MuxError::Closed),
            Some(_) if !started                 => Some(MuxError::Stopped),
            Some(_)                             => None,
        }
    }
}

impl Drop for ConnectionRouter {
    fn drop(&mut self) {
        if let Ok(slot) = self.recv_task.get_mut() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

// ----------------------------------------------------------------------------
// [수신 루프]
// ----------------------------------------------------------------------------

async fn run_receive_loop(
    transport: Arc<UdpTransport>,
    registry:  Arc<SessionRegistry>,
    config:    RouterConfig,
) {
    info!("[router] receive loop on {}", transport.local_addr());

    loop {
        let packet = match transport.read().await {
            Ok(p)  => p,
            Err(e) => {
                info!("[router] receive loop exiting: {}", e);
                // 대기 중인 accept() 가 Closed 를 보도록
                registry.wake_all();
                break;
            }
        };

        if packet.payload.is_empty() { continue; }

        let kind = classify(&packet.payload);
        trace!("[router] {} bytes from {} kind={:?} byte0=0x{:02x}",
            packet.payload.len(), packet.remote_addr, kind, packet.payload[0]);

        if kind == PacketKind::Stun && config.answer_stun {
            handle_stun(&transport, &packet, config.stun_password.as_deref()).await;
            continue;
        }

        let remote_addr = packet.remote_addr;
        match registry.route(remote_addr, packet.payload) {
            Routed::Session                          => trace!("[router] → session addr={}", remote_addr),
            Routed::Pending(PendingInsert::New)      => debug!("[router] new pending addr={}", remote_addr),
            Routed::Pending(PendingInsert::Replaced) => debug!("[router] pending replaced addr={}", remote_addr),
            Routed::Pending(PendingInsert::Evicted(old)) => {
                warn!("[router] pending table full, evicted addr={} for addr={}", old, remote_addr);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// [STUN 핸들러] Binding Request 에 즉시 응답, 세션/pending 으로는 보내지 않음
// ----------------------------------------------------------------------------

async fn handle_stun(transport: &UdpTransport, packet: &UdpPacket, password: Option<&str>) {
    match answer_binding(&packet.payload, packet.remote_addr, password) {
        Ok(Some(resp)) => {
            if let Err(e) = transport.write(packet.remote_addr, &resp).await {
                warn!("[stun] response to {} failed: {}", packet.remote_addr, e);
            } else {
                trace!("[stun] Binding Response sent to {}", packet.remote_addr);
            }
        }
        Ok(None) => {}
        Err(e)   => debug!("[stun] dropping packet from {}: {}", packet.remote_addr, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_stun() {
        assert_eq!(classify(&[0x00]), PacketKind::Stun);
        assert_eq!(classify(&[0x01]), PacketKind::Stun);
        assert_eq!(classify(&[0x03]), PacketKind::Stun);
    }

    #[test]
    fn classify_dtls() {
        assert_eq!(classify(&[0x16]), PacketKind::Dtls); // Handshake
        assert_eq!(classify(&[0x14]), PacketKind::Dtls); // ChangeCipherSpec
        assert_eq!(classify(&[0x17]), PacketKind::Dtls); // ApplicationData
    }

    #[test]
    fn classify_other() {
        assert_eq!(classify(&[0x80]), PacketKind::Other);
        assert_eq!(classify(&[0x50]), PacketKind::Other);
        assert_eq!(classify(&[]), PacketKind::Other);
    }

    #[test]
    fn new_router_is_idle() {
        let router = ConnectionRouter::new(RouterConfig::default());
        assert!(!router.is_started());
        assert!(matches!(router.local_certificate(), Err(MuxError::NotStarted)));
        assert_eq!(router.pending_count(), 0);
        assert_eq!(router.established_count(), 0);
        router.stop(); // 시작 전 stop 도 무해
    }

    #[tokio::test]
    async fn accept_before_start_reports_not_started() {
        let router = ConnectionRouter::new(RouterConfig::default());
        assert!(matches!(router.accept().await, Err(MuxError::NotStarted)));
    }

    #[tokio::test]
    async fn transport_close_ends_accept() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let router    = Arc::new(ConnectionRouter::new(RouterConfig::default()));
        router.start(Arc::clone(&transport)).unwrap();

        let acceptor = {
            let router = Arc::clone(&router);
            tokio::spawn(async move { router.accept().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        transport.close();
        let result = tokio::time::timeout(std::time::Duration::from_secs(2), acceptor)
            .await
            .expect("accept did not return after transport close")
            .unwrap();
        assert!(matches!(result, Err(MuxError::Closed)));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!router.is_started());
        assert!(matches!(router.accept().await, Err(MuxError::Closed)));
        assert!(matches!(router.connect("127.0.0.1:9".parse().unwrap()).await, Err(MuxError::Closed)));
    }
}

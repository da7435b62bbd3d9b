// author: kodeholic (powered by Claude)
// DtlsSession: 원격 주소 1개당 1개
//
// 상태 전이:
//   New → Handshaking → Established
//   Handshaking → (실패) : 세션 객체가 만들어지지 않고 라우터가 로그만 남김
//   Established → Closed : close() 또는 drop
//
// 핸드셰이크는 DTLSConn::new 가 SessionConn 을 통해 엔진을 끝까지 펌핑합니다.
// 상대 인증서는 verify 콜백에서 잡아두고, 성공한 뒤에만 세션에 노출합니다.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dtls::config::{ClientAuthType, Config, ExtendedMasterSecretType};
use dtls::conn::DTLSConn;
use rustls_pki_types::CertificateDer;
use tracing::{debug, info};

use crate::config::RECORD_BUF_SIZE;
use crate::error::{MuxError, MuxResult};
use crate::mux::cert::ServerCert;
use crate::mux::conn::SessionConn;
use crate::mux::net::UdpTransport;
use crate::mux::registry::{InboundRx, SessionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Handshaking,
    Established,
    Closed,
}

/// DTLS 역할: accept() 는 Server, connect() 는 Client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

type CapturedCert = Arc<Mutex<Option<Vec<u8>>>>;

pub struct DtlsSession {
    remote_addr:        SocketAddr,
    local_addr:         SocketAddr,
    role:               Role,
    conn:               DTLSConn,
    local_certificate:  Vec<u8>,
    remote_certificate: Option<Vec<u8>>,
    registry:           Arc<SessionRegistry>,
    closed:             AtomicBool,
}

/// handshake() 에 필요한 공유 자원 묶음
pub(crate) struct HandshakeContext<'a> {
    pub transport:  Arc<UdpTransport>,
    pub cert:       &'a ServerCert,
    pub registry:   Arc<SessionRegistry>,
    pub timeout_ms: u64,
}

impl DtlsSession {
    /// 이미 registry 에 등록된 주소에 대해 핸드셰이크를 끝까지 구동.
    /// 실패 시 registry 정리는 호출자 몫.
    pub(crate) async fn handshake(
        ctx:         HandshakeContext<'_>,
        remote_addr: SocketAddr,
        inbound:     InboundRx,
        role:        Role,
    ) -> MuxResult<Self> {
        let mut state = SessionState::New;
        let local_addr = ctx.transport.local_addr();

        let captured: CapturedCert = Arc::new(Mutex::new(None));
        let config = engine_config(ctx.cert, role, Arc::clone(&captured));
        let conn   = Arc::new(SessionConn::new(ctx.transport, remote_addr, inbound));

        advance(&mut state, SessionState::Handshaking, remote_addr);

        let timeout = Duration::from_millis(ctx.timeout_ms);
        let engine  = DTLSConn::new(conn, config, role == Role::Client, None);
        let dtls_conn = match tokio::time::timeout(timeout, engine).await {
            Ok(Ok(c))  => c,
            Ok(Err(e)) => return Err(MuxError::Handshake(e.to_string())),
            Err(_)     => return Err(MuxError::HandshakeTimeout(ctx.timeout_ms)),
        };

        let remote_certificate = captured.lock().unwrap().take();
        advance(&mut state, SessionState::Established, remote_addr);
        info!("[dtls] handshake complete addr={} role={:?} peer_cert={}",
            remote_addr, role, remote_certificate.is_some());

        Ok(Self {
            remote_addr,
            local_addr,
            role,
            conn: dtls_conn,
            local_certificate: ctx.cert.der.clone(),
            remote_certificate,
            registry: ctx.registry,
            closed: AtomicBool::new(false),
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        if self.is_closed() { SessionState::Closed } else { SessionState::Established }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn local_certificate(&self) -> &[u8] {
        &self.local_certificate
    }

    /// 핸드셰이크 중 verify 콜백이 받은 상대 리프 인증서 (DER)
    pub fn remote_certificate(&self) -> Option<&[u8]> {
        self.remote_certificate.as_deref()
    }

    /// 다음 application record 복호화까지 대기
    pub async fn read(&self) -> MuxResult<Vec<u8>> {
        if self.is_closed() {
            return Err(MuxError::Closed);
        }
        let mut buf = vec![0u8; RECORD_BUF_SIZE];
        match self.conn.read(&mut buf, None).await {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(_) if self.is_closed()          => Err(MuxError::Closed),
            Err(dtls::Error::ErrConnClosed)     => Err(MuxError::Closed),
            Err(e)                              => Err(MuxError::Record(e.to_string())),
        }
    }

    /// 암호화 후 엔진 출력 경로(SessionConn::send)로 전송
    pub async fn write(&self, payload: &[u8]) -> MuxResult<usize> {
        if self.is_closed() {
            return Err(MuxError::Closed);
        }
        match self.conn.write(payload, None).await {
            Ok(n)                           => Ok(n),
            Err(dtls::Error::ErrConnClosed) => Err(MuxError::Closed),
            Err(e)                          => Err(MuxError::Record(e.to_string())),
        }
    }

    /// close_notify 전송 + registry 에서 주소 해제. 두 번째 호출은 no-op
    pub async fn close(&self) -> MuxResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("[dtls] close called twice addr={}", self.remote_addr);
            return Ok(());
        }
        let result = self.conn.close().await;
        self.registry.remove(&self.remote_addr);
        info!("[dtls] session closed addr={}", self.remote_addr);
        result.map_err(|e| MuxError::Record(e.to_string()))
    }
}

impl Drop for DtlsSession {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.registry.remove(&self.remote_addr);
            debug!("[dtls] session dropped without close addr={}", self.remote_addr);
        }
    }
}

fn advance(state: &mut SessionState, next: SessionState, remote_addr: SocketAddr) {
    debug!("[dtls] addr={} {:?} → {:?}", remote_addr, state, next);
    *state = next;
}

// ============================================================================
// [엔진 설정]
//
// - 자체서명 인증서 상호 교환: 체인 검증은 건너뛰고 verify 콜백으로 리프만 수집
// - Server 역할은 클라이언트 인증서 필수 (RequireAnyClientCert)
// - HelloVerifyRequest 쿠키 교환은 엔진 기본값 유지
// ============================================================================

fn engine_config(cert: &ServerCert, role: Role, captured: CapturedCert) -> Config {
    let verify = move |certs: &[Vec<u8>], _chains: &[CertificateDer<'static>]| -> Result<(), dtls::Error> {
        match certs.first() {
            Some(leaf) => {
                *captured.lock().unwrap() = Some(leaf.clone());
                Ok(())
            }
            None => Err(dtls::Error::Other("peer presented no certificate".to_string())),
        }
    };

    let client_auth = match role {
        Role::Server => ClientAuthType::RequireAnyClientCert,
        Role::Client => ClientAuthType::NoClientCert,
    };

    Config {
        certificates: vec![cert.dtls_cert.clone()],
        extended_master_secret: ExtendedMasterSecretType::Require,
        insecure_skip_verify: true,
        client_auth,
        verify_peer_certificate: Some(Arc::new(verify)),
        ..Default::default()
    }
}

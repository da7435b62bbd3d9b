// author: kodeholic (powered by Claude)

pub mod config;
pub mod crypto;
pub mod error;
pub mod mux;
pub mod stun;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

pub use config::RouterConfig;
pub use error::{MuxError, MuxResult};
pub use mux::{ConnectionRouter, DtlsSession, UdpPacket, UdpTransport};

/// CLI에서 주입되는 런타임 설정
/// - 기본값은 config.rs 상수
pub struct ServerArgs {
    pub bind_addr:            SocketAddr,
    pub handshake_timeout_ms: u64,
    pub pending_capacity:     usize,
    pub stun_password:        Option<String>,
}

/// DTLS 에코 서버: accept 된 세션마다 태스크 1개, 받은 record 를 그대로 돌려보냄
pub async fn run_server(args: ServerArgs) -> MuxResult<()> {
    let transport = UdpTransport::bind(args.bind_addr).await?;

    let router = Arc::new(ConnectionRouter::new(RouterConfig {
        pending_capacity:     args.pending_capacity,
        handshake_timeout_ms: args.handshake_timeout_ms,
        stun_password:        args.stun_password,
        ..RouterConfig::default()
    }));
    router.start(Arc::clone(&transport))?;

    info!("[mini-rtcmux] DTLS echo on udp://{}", transport.local_addr());
    info!("[mini-rtcmux] DTLS fingerprint: {}", router.local_fingerprint()?);

    loop {
        let session = match router.accept().await {
            Ok(s)  => s,
            Err(e) => { warn!("[mini-rtcmux] accept loop ended: {}", e); return Err(e); }
        };
        info!("[mini-rtcmux] session up addr={}", session.remote_addr());
        tokio::spawn(run_echo(session));
    }
}

async fn run_echo(session: DtlsSession) {
    loop {
        let payload = match session.read().await {
            Ok(p)  => p,
            Err(e) => { debug!("[echo] read ended addr={}: {}", session.remote_addr(), e); break; }
        };
        if let Err(e) = session.write(&payload).await {
            warn!("[echo] write failed addr={}: {}", session.remote_addr(), e);
            break;
        }
    }
    if let Err(e) = session.close().await {
        debug!("[echo] close addr={}: {}", session.remote_addr(), e);
    }
}

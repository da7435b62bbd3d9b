// author: kodeholic (powered by Claude)

use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use mini_rtcmux::config;
use mini_rtcmux::{run_server, ServerArgs};

#[derive(Parser)]
#[command(
    name    = "rmserver",
    about   = "공유 UDP 소켓 위의 DTLS 에코 서버 (STUN Binding 응답 포함)",
    version,
)]
struct Cli {
    /// 바인딩 IP
    #[arg(long, default_value = "0.0.0.0")]
    ip: IpAddr,

    /// UDP 포트
    #[arg(long, short = 'p', default_value_t = config::SERVER_UDP_PORT)]
    port: u16,

    /// DTLS 핸드셰이크 타임아웃 (밀리초)
    #[arg(long, default_value_t = config::DTLS_HANDSHAKE_TIMEOUT_MS)]
    handshake_timeout_ms: u64,

    /// pending 테이블 용량
    #[arg(long, default_value_t = config::PENDING_TABLE_CAPACITY)]
    pending_capacity: usize,

    /// STUN MESSAGE-INTEGRITY 키 (ICE pwd). 환경변수 RTCMUX_STUN_PASSWORD 로도 지정 가능
    #[arg(long, env = "RTCMUX_STUN_PASSWORD")]
    stun_password: Option<String>,
}

#[tokio::main]
async fn main() {
    // 환경 변수 기반 로깅 초기화 (기본값: info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let args = ServerArgs {
        bind_addr:            SocketAddr::new(cli.ip, cli.port),
        handshake_timeout_ms: cli.handshake_timeout_ms,
        pending_capacity:     cli.pending_capacity,
        stun_password:        cli.stun_password,
    };

    if let Err(e) = run_server(args).await {
        error!("[rmserver] fatal: {}", e);
        std::process::exit(1);
    }
}

// author: kodeholic (powered by Claude)
// rmprobe: rmserver 연결 점검 CLI
//
// 사용법:
//   rmprobe [--host HOST] [--port PORT] [--password PWD] [--count N] [MESSAGE]
//
// 순서:
//   1. STUN Binding Request → XOR-MAPPED-ADDRESS 확인 (라우터 시작 전, 소켓 직접 사용)
//   2. 같은 소켓으로 DTLS connect → 서버 인증서 지문 출력
//   3. MESSAGE 를 N번 보내고 에코 확인

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use mini_rtcmux::crypto::sha256_fingerprint;
use mini_rtcmux::stun::attribute::{ATTR_ERROR_CODE, ATTR_XOR_MAPPED_ADDRESS};
use mini_rtcmux::stun::message::BINDING_SUCCESS;
use mini_rtcmux::stun::{binding_request, StunMessage, TransactionId};
use mini_rtcmux::{ConnectionRouter, MuxResult, RouterConfig, UdpTransport};

const STUN_TIMEOUT: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// [CLI 인자]
// ----------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name    = "rmprobe",
    about   = "mini-rtcmux 서버 STUN/DTLS 연결 점검",
    version,
)]
struct Cli {
    /// 서버 호스트
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// 서버 UDP 포트
    #[arg(long, short = 'p', default_value_t = 10000)]
    port: u16,

    /// STUN MESSAGE-INTEGRITY 키
    #[arg(long)]
    password: Option<String>,

    /// STUN USERNAME
    #[arg(long, default_value = "rmprobe:rmserver")]
    username: String,

    /// 에코 반복 횟수
    #[arg(long, short = 'n', default_value_t = 3)]
    count: u32,

    /// 보낼 메시지
    #[arg(default_value = "ping")]
    message: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli    = Cli::parse();
    let server = SocketAddr::new(cli.host, cli.port);

    println!("{}", "─".repeat(70).dimmed());
    println!("{} {}", "target".bold(), server.to_string().cyan());
    println!("{}", "─".repeat(70).dimmed());

    if let Err(e) = run(&cli, server).await {
        println!("{} {}", "✗".red().bold(), e.to_string().red());
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, server: SocketAddr) -> MuxResult<()> {
    let unspecified: IpAddr = match server {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let bind = SocketAddr::new(unspecified, 0);
    let transport = UdpTransport::bind(bind).await?;

    // 1. STUN Binding
    stun_check(&transport, server, &cli.username, cli.password.as_deref()).await?;

    // 2. DTLS
    let router = ConnectionRouter::new(RouterConfig { answer_stun: false, ..RouterConfig::default() });
    router.start(Arc::clone(&transport))?;

    let started = Instant::now();
    let session = router.connect(server).await?;
    println!("{} dtls handshake {} ({} ms)",
        "✔".green().bold(), "ok".green(), started.elapsed().as_millis());
    match session.remote_certificate() {
        Some(der) => println!("  server {}", sha256_fingerprint(der).yellow()),
        None      => println!("  server certificate {}", "missing".red()),
    }

    // 3. 에코
    for i in 1..=cli.count {
        let sent_at = Instant::now();
        session.write(cli.message.as_bytes()).await?;
        let echoed = session.read().await?;
        let rtt    = sent_at.elapsed().as_micros() as f64 / 1000.0;

        if echoed == cli.message.as_bytes() {
            println!("{} #{} {} bytes  rtt={:.2}ms", "✔".green(), i, echoed.len(), rtt);
        } else {
            println!("{} #{} mismatch: {:?}", "✗".red(), i, String::from_utf8_lossy(&echoed));
        }
    }

    session.close().await?;
    router.stop();
    transport.close();
    Ok(())
}

async fn stun_check(
    transport: &UdpTransport,
    server:    SocketAddr,
    username:  &str,
    password:  Option<&str>,
) -> MuxResult<()> {
    let txid    = TransactionId::random();
    let request = binding_request(txid, Some(username), password)?;
    transport.write(server, &request).await?;

    let packet = match tokio::time::timeout(STUN_TIMEOUT, transport.read()).await {
        Ok(p)  => p?,
        Err(_) => {
            println!("{} stun binding {}", "…".yellow(), "no response".yellow());
            return Ok(());
        }
    };

    let response = StunMessage::decode(&packet.payload)?;
    if response.transaction_id != txid {
        println!("{} stun binding {}", "✗".red(), "transaction id mismatch".red());
        return Ok(());
    }

    if response.msg_type == BINDING_SUCCESS {
        let mapped = response
            .get(ATTR_XOR_MAPPED_ADDRESS)
            .map(|a| a.as_xor_mapped_address(&txid))
            .transpose()?;
        match mapped {
            Some(addr) => println!("{} stun binding ok  mapped={}", "✔".green().bold(), addr.to_string().cyan()),
            None       => println!("{} stun binding ok  (no mapped address)", "✔".green()),
        }
    } else if let Some(attr) = response.get(ATTR_ERROR_CODE) {
        let (code, reason) = attr.error_code()?;
        println!("{} stun binding error {} {}", "✗".red(), code, reason.red());
    }
    Ok(())
}

// author: kodeholic (powered by Claude)

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MuxError {
    /// STUN 바이트열 파싱 실패 (길이 불일치, 잘린 attribute 등)
    #[error("Malformed STUN message: {0}")]
    Format(String),

    /// DTLS 엔진이 재시도 불가능한 상태를 보고
    #[error("DTLS handshake failed: {0}")]
    Handshake(String),

    #[error("DTLS handshake timed out after {0}ms")]
    HandshakeTimeout(u64),

    /// 핸드셰이크 완료 이후 레코드 암복호화 실패
    #[error("DTLS record error: {0}")]
    Record(String),

    /// 닫힌 transport/session 접근: "아직 데이터 없음"과 구분되는 명시적 신호
    #[error("Resource closed")]
    Closed,

    #[error("Router not started")]
    NotStarted,

    #[error("Router stopped")]
    Stopped,

    #[error("Session already established for {0}")]
    AlreadyEstablished(SocketAddr),

    #[error("Certificate generation failed: {0}")]
    Certificate(String),

    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type MuxResult<T> = Result<T, MuxError>;

// author: kodeholic (powered by Claude)
// 매직 넘버를 배제하고 전송 계층의 한계를 제어하는 상수 모음입니다.

/// 기본 UDP 포트 (rmserver)
pub const SERVER_UDP_PORT: u16 = 10000;

/// UDP 수신 버퍼: 단일 데이터그램 최대 크기
pub const UDP_RECV_BUF_SIZE: usize = 65535;

/// DTLS 레코드 복호화 버퍼 (record payload 최대 2^14)
pub const RECORD_BUF_SIZE: usize = 16 * 1024;

/// 미확립 주소의 pending 테이블 최대 엔트리 수.
/// 가득 찬 상태에서 새 주소가 도착하면 가장 오래된 엔트리를 밀어냅니다.
pub const PENDING_TABLE_CAPACITY: usize = 64;

/// DTLS 핸드셰이크 최대 허용 시간 (10초)
pub const DTLS_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// 자체서명 인증서 SAN
pub const CERT_SUBJECT: &str = "mini-rtcmux";

/// STUN Binding Request 자동 응답 여부 (기본값)
pub const ANSWER_STUN_DEFAULT: bool = true;

// ----------------------------------------------------------------------------
// [RouterConfig] ConnectionRouter 런타임 설정
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub pending_capacity:     usize,
    pub handshake_timeout_ms: u64,
    /// true면 수신 루프가 STUN Binding Request에 직접 응답 (세션/pending 미진입)
    pub answer_stun:          bool,
    /// ICE pwd. 설정 시 Request의 MESSAGE-INTEGRITY 검증 + Response에 서명
    pub stun_password:        Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            pending_capacity:     PENDING_TABLE_CAPACITY,
            handshake_timeout_ms: DTLS_HANDSHAKE_TIMEOUT_MS,
            answer_stun:          ANSWER_STUN_DEFAULT,
            stun_password:        None,
        }
    }
}

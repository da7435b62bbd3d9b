// author: kodeholic (powered by Claude)
// STUN 무결성 속성과 인증서 지문에 쓰이는 해시 프리미티브
//
//   crc32     : FINGERPRINT (RFC 5389 §15.5), reflected CRC-32, poly 0xEDB88320
//   hmac_sha1 : MESSAGE-INTEGRITY (RFC 5389 §15.4), RFC 2104 HMAC, 블록 64바이트
//   sha256    : a=fingerprint 용 인증서 지문

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

type HmacSha1 = Hmac<Sha1>;

pub const HMAC_SHA1_LEN: usize = 20;

/// 표준 CRC-32 (init 0xFFFFFFFF, 결과 비트 반전)
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// HMAC-SHA1. 64바이트 초과 키는 SHA1으로 압축, 미만은 zero-pad
pub fn hmac_sha1(key: &[u8], message: &[u8]) -> [u8; HMAC_SHA1_LEN] {
    let mut mac = new_mac(key);
    mac.update(message);
    let mut out = [0u8; HMAC_SHA1_LEN];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// 상수 시간 비교로 tag 검증
pub fn hmac_sha1_verify(key: &[u8], message: &[u8], tag: &[u8]) -> bool {
    let mut mac = new_mac(key);
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}

fn new_mac(key: &[u8]) -> HmacSha1 {
    match HmacSha1::new_from_slice(key) {
        Ok(mac) => mac,
        // HMAC은 임의 길이 키를 허용하므로 도달 불가
        Err(_) => unreachable!("HMAC-SHA1 accepts keys of any length"),
    }
}

/// "sha-256 AB:CD:..." 형태의 인증서 지문
pub fn sha256_fingerprint(der: &[u8]) -> String {
    let hash = Sha256::digest(der);
    let hex: Vec<String> = hash.iter().map(|b| format!("{:02X}", b)).collect();
    format!("sha-256 {}", hex.join(":"))
}

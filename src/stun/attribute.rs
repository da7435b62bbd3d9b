// author: kodeholic (powered by Claude)
// STUN attribute: type + 원본 바이트로 보관
//
// 와이어 포맷 (RFC 5389 §15):
//   type(16) | length(16) | value(length) | zero padding → 4바이트 경계
//   length 필드에는 padding 제외한 논리 길이만 기록
//
// 알려진 타입은 타입별 헬퍼로 해석하고, 모르는 타입(vendor 0xC057 등)은
// 바이트 그대로 통과시킵니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{MuxError, MuxResult};
use crate::stun::message::{TransactionId, MAGIC_COOKIE};

pub const ATTR_USERNAME:           u16 = 0x0006;
pub const ATTR_MESSAGE_INTEGRITY:  u16 = 0x0008;
pub const ATTR_ERROR_CODE:         u16 = 0x0009;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const ATTR_FINGERPRINT:        u16 = 0x8028;

/// type(2) + length(2)
pub const ATTR_HEADER_SIZE: usize = 4;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// 4바이트 경계로 올림
#[inline]
pub fn pad4(len: usize) -> usize {
    (len + 3) & !3
}

/// 타입 코드 → 논리적 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Username,
    MessageIntegrity,
    ErrorCode,
    XorMappedAddress,
    Fingerprint,
    /// comprehension-optional / vendor 범위 포함: 해석 없이 통과
    Other(u16),
}

impl From<u16> for AttributeKind {
    fn from(code: u16) -> Self {
        match code {
            ATTR_USERNAME           => AttributeKind::Username,
            ATTR_MESSAGE_INTEGRITY  => AttributeKind::MessageIntegrity,
            ATTR_ERROR_CODE         => AttributeKind::ErrorCode,
            ATTR_XOR_MAPPED_ADDRESS => AttributeKind::XorMappedAddress,
            ATTR_FINGERPRINT        => AttributeKind::Fingerprint,
            other                   => AttributeKind::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunAttribute {
    pub attr_type: u16,
    pub value:     Vec<u8>,
}

impl StunAttribute {
    pub fn new(attr_type: u16, value: impl Into<Vec<u8>>) -> Self {
        Self { attr_type, value: value.into() }
    }

    pub fn kind(&self) -> AttributeKind {
        AttributeKind::from(self.attr_type)
    }

    /// 헤더 + padding 포함 와이어 길이
    pub fn encoded_len(&self) -> usize {
        ATTR_HEADER_SIZE + pad4(self.value.len())
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> MuxResult<()> {
        let len = u16::try_from(self.value.len()).map_err(|_| {
            MuxError::Format(format!(
                "attribute 0x{:04x} value of {} bytes exceeds 65535",
                self.attr_type,
                self.value.len()
            ))
        })?;
        out.extend_from_slice(&self.attr_type.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.value);
        out.resize(out.len() + pad4(self.value.len()) - self.value.len(), 0);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // USERNAME
    // ------------------------------------------------------------------------

    pub fn username(name: &str) -> Self {
        Self::new(ATTR_USERNAME, name.as_bytes())
    }

    /// UTF-8이 아니거나 USERNAME이 아니면 None
    pub fn as_username(&self) -> Option<&str> {
        if self.attr_type != ATTR_USERNAME {
            return None;
        }
        std::str::from_utf8(&self.value).ok()
    }

    // ------------------------------------------------------------------------
    // ERROR-CODE
    // ------------------------------------------------------------------------

    /// ERROR-CODE 해석 → (code, reason)
    pub fn error_code(&self) -> MuxResult<(u16, String)> {
        if self.attr_type != ATTR_ERROR_CODE {
            return Err(MuxError::Format(format!(
                "attribute 0x{:04x} is not ERROR-CODE",
                self.attr_type
            )));
        }
        if self.value.len() < 4 {
            return Err(MuxError::Format(format!(
                "ERROR-CODE too short: {} bytes",
                self.value.len()
            )));
        }
        let class  = (self.value[2] & 0x07) as u16;
        let number = self.value[3] as u16;
        if !(3..=6).contains(&class) || number > 99 {
            return Err(MuxError::Format(format!(
                "ERROR-CODE out of range: class={} number={}",
                class, number
            )));
        }
        let reason = String::from_utf8_lossy(&self.value[4..]).into_owned();
        Ok((class * 100 + number, reason))
    }

    // ------------------------------------------------------------------------
    // XOR-MAPPED-ADDRESS (RFC 5389 §15.2)
    //   0 | family | X-Port | X-Address(32 or 128 bits)
    //   port ^ cookie 상위 16비트, IPv4 ^ cookie, IPv6 ^ (cookie || txid)
    // ------------------------------------------------------------------------

    pub fn xor_mapped_address(addr: SocketAddr, txid: &TransactionId) -> Self {
        let mut value = Vec::with_capacity(20);
        value.push(0x00);
        let xor_port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
        match addr.ip() {
            IpAddr::V4(ip) => {
                value.push(FAMILY_IPV4);
                value.extend_from_slice(&xor_port.to_be_bytes());
                value.extend_from_slice(&(u32::from(ip) ^ MAGIC_COOKIE).to_be_bytes());
            }
            IpAddr::V6(ip) => {
                value.push(FAMILY_IPV6);
                value.extend_from_slice(&xor_port.to_be_bytes());
                let mask = ipv6_mask(txid);
                value.extend(ip.octets().iter().zip(mask.iter()).map(|(a, m)| a ^ m));
            }
        }
        Self::new(ATTR_XOR_MAPPED_ADDRESS, value)
    }

    pub fn as_xor_mapped_address(&self, txid: &TransactionId) -> MuxResult<SocketAddr> {
        if self.attr_type != ATTR_XOR_MAPPED_ADDRESS {
            return Err(MuxError::Format(format!(
                "attribute 0x{:04x} is not XOR-MAPPED-ADDRESS",
                self.attr_type
            )));
        }
        let v = &self.value;
        if v.len() < 4 {
            return Err(MuxError::Format("XOR-MAPPED-ADDRESS too short".into()));
        }
        let port = u16::from_be_bytes([v[2], v[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
        match (v[1], v.len()) {
            (FAMILY_IPV4, 8) => {
                let raw = u32::from_be_bytes([v[4], v[5], v[6], v[7]]) ^ MAGIC_COOKIE;
                Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(raw)), port))
            }
            (FAMILY_IPV6, 20) => {
                let mask = ipv6_mask(txid);
                let mut octets = [0u8; 16];
                for (i, o) in octets.iter_mut().enumerate() {
                    *o = v[4 + i] ^ mask[i];
                }
                Ok(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
            }
            (family, len) => Err(MuxError::Format(format!(
                "XOR-MAPPED-ADDRESS bad family={} len={}",
                family, len
            ))),
        }
    }
}

fn ipv6_mask(txid: &TransactionId) -> [u8; 16] {
    let mut mask = [0u8; 16];
    mask[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    mask[4..].copy_from_slice(txid.as_bytes());
    mask
}

// ----------------------------------------------------------------------------
// [StunErrorCode] ERROR-CODE 심볼 (RFC 5389 §15.6, RFC 8445 §7.3.1.1)
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunErrorCode {
    TryAlternate,
    BadRequest,
    Unauthorized,
    UnknownAttribute,
    StaleNonce,
    RoleConflict,
    ServerError,
}

impl StunErrorCode {
    pub fn code(self) -> u16 {
        match self {
            StunErrorCode::TryAlternate     => 300,
            StunErrorCode::BadRequest       => 400,
            StunErrorCode::Unauthorized     => 401,
            StunErrorCode::UnknownAttribute => 420,
            StunErrorCode::StaleNonce       => 438,
            StunErrorCode::RoleConflict     => 487,
            StunErrorCode::ServerError      => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StunErrorCode::TryAlternate     => "Try Alternate",
            StunErrorCode::BadRequest       => "Bad Request",
            StunErrorCode::Unauthorized     => "Unauthorized",
            StunErrorCode::UnknownAttribute => "Unknown Attribute",
            StunErrorCode::StaleNonce       => "Stale Nonce",
            StunErrorCode::RoleConflict     => "Role Conflict",
            StunErrorCode::ServerError      => "Server Error",
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            300 => Some(StunErrorCode::TryAlternate),
            400 => Some(StunErrorCode::BadRequest),
            401 => Some(StunErrorCode::Unauthorized),
            420 => Some(StunErrorCode::UnknownAttribute),
            438 => Some(StunErrorCode::StaleNonce),
            487 => Some(StunErrorCode::RoleConflict),
            500 => Some(StunErrorCode::ServerError),
            _   => None,
        }
    }

    /// ERROR-CODE attribute 생성: 0 | 0 | class(3bit) | number | reason
    pub fn encode(self) -> StunAttribute {
        let code   = self.code();
        let reason = self.reason();
        let mut value = Vec::with_capacity(4 + reason.len());
        value.extend_from_slice(&[0x00, 0x00, (code / 100) as u8, (code % 100) as u8]);
        value.extend_from_slice(reason.as_bytes());
        StunAttribute::new(ATTR_ERROR_CODE, value)
    }
}

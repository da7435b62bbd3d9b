// author: kodeholic (powered by Claude)
// STUN 메시지 코덱 (RFC 5389 §6)
//
// 헤더 20바이트 (big-endian):
//   00 | type(14) | length(16) | magic cookie(32) | transaction id(96)
//   length = 헤더 제외 body 바이트 수 = Σ attribute 패딩 포함 길이
//
// 인코더는 항상 마지막 attribute로 FINGERPRINT 를 정확히 1개 붙입니다.
// 호출자가 넣은 FINGERPRINT 는 버리고 다시 계산합니다.

use crate::crypto::{crc32, hmac_sha1, hmac_sha1_verify, HMAC_SHA1_LEN};
use crate::error::{MuxError, MuxResult};
use crate::stun::attribute::{
    pad4, StunAttribute, ATTR_FINGERPRINT, ATTR_HEADER_SIZE, ATTR_MESSAGE_INTEGRITY,
};

pub const HEADER_SIZE:      usize = 20;
pub const MAGIC_COOKIE:     u32   = 0x2112_A442;
pub const FINGERPRINT_XOR:  u32   = 0x5354_554E;
pub const TRANSACTION_ID_LEN: usize = 12;

pub const BINDING_REQUEST:    u16 = 0x0001;
pub const BINDING_INDICATION: u16 = 0x0011;
pub const BINDING_SUCCESS:    u16 = 0x0101;
pub const BINDING_ERROR:      u16 = 0x0111;

const FINGERPRINT_ATTR_LEN: usize = ATTR_HEADER_SIZE + 4;
const INTEGRITY_ATTR_LEN:   usize = ATTR_HEADER_SIZE + HMAC_SHA1_LEN;

// ----------------------------------------------------------------------------
// [TransactionId] 항상 12바이트
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId([u8; TRANSACTION_ID_LEN]);

impl TransactionId {
    pub fn new(bytes: [u8; TRANSACTION_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_slice(s: &[u8]) -> MuxResult<Self> {
        let bytes: [u8; TRANSACTION_ID_LEN] = s.try_into().map_err(|_| {
            MuxError::Format(format!("transaction id must be 12 bytes, got {}", s.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; TRANSACTION_ID_LEN] {
        &self.0
    }
}

// ----------------------------------------------------------------------------
// [MessageClass] type 필드의 C1/C0 비트 (bit 8, bit 4)
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

// ----------------------------------------------------------------------------
// [StunMessage]
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    pub msg_type:       u16,
    pub transaction_id: TransactionId,
    pub attributes:     Vec<StunAttribute>,
}

impl StunMessage {
    pub fn new(msg_type: u16, transaction_id: TransactionId) -> Self {
        Self { msg_type, transaction_id, attributes: Vec::new() }
    }

    pub fn with_attribute(mut self, attr: StunAttribute) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn push(&mut self, attr: StunAttribute) {
        self.attributes.push(attr);
    }

    /// 같은 타입이 여럿이면 첫 번째
    pub fn get(&self, attr_type: u16) -> Option<&StunAttribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    pub fn class(&self) -> MessageClass {
        match ((self.msg_type >> 7) & 0x2) | ((self.msg_type >> 4) & 0x1) {
            0b00 => MessageClass::Request,
            0b01 => MessageClass::Indication,
            0b10 => MessageClass::SuccessResponse,
            _    => MessageClass::ErrorResponse,
        }
    }

    /// class 비트를 제거한 12비트 method (Binding = 0x001)
    pub fn method(&self) -> u16 {
        let t = self.msg_type;
        (t & 0x000F) | ((t & 0x00E0) >> 1) | ((t & 0x3E00) >> 2)
    }

    // ------------------------------------------------------------------------
    // 디코딩: 실패 시 부분 메시지 없이 Format 에러
    // ------------------------------------------------------------------------

    pub fn decode(buf: &[u8]) -> MuxResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(MuxError::Format(format!(
                "buffer shorter than header: {} bytes",
                buf.len()
            )));
        }

        let msg_type = u16::from_be_bytes([buf[0], buf[1]]);
        if msg_type & 0xC000 != 0 {
            return Err(MuxError::Format(format!(
                "reserved type bits set: 0x{:04x}",
                msg_type
            )));
        }

        let body_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        let cookie   = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(MuxError::Format(format!("bad magic cookie: 0x{:08x}", cookie)));
        }

        if HEADER_SIZE + body_len != buf.len() {
            return Err(MuxError::Format(format!(
                "declared length {} does not match {} body bytes",
                body_len,
                buf.len() - HEADER_SIZE
            )));
        }
        if body_len % 4 != 0 {
            return Err(MuxError::Format(format!(
                "body length {} not 4-byte aligned",
                body_len
            )));
        }

        let transaction_id = TransactionId::from_slice(&buf[8..HEADER_SIZE])?;

        let mut attributes = Vec::new();
        let mut offset     = HEADER_SIZE;
        while offset < buf.len() {
            let attr_type = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
            let attr_len  = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            offset += ATTR_HEADER_SIZE;

            if offset + pad4(attr_len) > buf.len() {
                return Err(MuxError::Format(format!(
                    "attribute 0x{:04x} length {} overruns body ({} bytes left)",
                    attr_type,
                    attr_len,
                    buf.len() - offset
                )));
            }

            attributes.push(StunAttribute::new(attr_type, &buf[offset..offset + attr_len]));
            offset += pad4(attr_len);

            // FINGERPRINT 는 항상 마지막
            if attr_type == ATTR_FINGERPRINT && offset < buf.len() {
                return Err(MuxError::Format(format!(
                    "{} bytes of attributes after FINGERPRINT",
                    buf.len() - offset
                )));
            }
        }

        Ok(Self { msg_type, transaction_id, attributes })
    }

    // ------------------------------------------------------------------------
    // 인코딩
    // ------------------------------------------------------------------------

    /// header + attributes(삽입 순서) + FINGERPRINT
    pub fn encode(&self) -> MuxResult<Vec<u8>> {
        let mut out = self.encode_without(&[ATTR_FINGERPRINT])?;
        append_fingerprint(&mut out)?;
        Ok(out)
    }

    /// header + attributes + MESSAGE-INTEGRITY(key) + FINGERPRINT
    pub fn encode_with_integrity(&self, key: &[u8]) -> MuxResult<Vec<u8>> {
        let mut out = self.encode_without(&[ATTR_MESSAGE_INTEGRITY, ATTR_FINGERPRINT])?;
        append_integrity(&mut out, key)?;
        append_fingerprint(&mut out)?;
        Ok(out)
    }

    fn encode_without(&self, skip: &[u16]) -> MuxResult<Vec<u8>> {
        let mut out = Vec::with_capacity(HEADER_SIZE + 64);
        out.extend_from_slice(&self.msg_type.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x00]); // length placeholder
        out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        out.extend_from_slice(self.transaction_id.as_bytes());

        for attr in self.attributes.iter().filter(|a| !skip.contains(&a.attr_type)) {
            attr.write_to(&mut out)?;
        }
        let body_len = out.len() - HEADER_SIZE;
        set_body_len(&mut out, body_len)?;
        Ok(out)
    }
}

fn set_body_len(out: &mut [u8], body_len: usize) -> MuxResult<()> {
    let len = u16::try_from(body_len).map_err(|_| {
        MuxError::Format(format!("message body of {} bytes exceeds 65535", body_len))
    })?;
    out[2..4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

// MESSAGE-INTEGRITY: length 필드를 이 attribute 끝까지로 맞춘 뒤 HMAC 계산
fn append_integrity(out: &mut Vec<u8>, key: &[u8]) -> MuxResult<()> {
    let body_len = out.len() - HEADER_SIZE + INTEGRITY_ATTR_LEN;
    set_body_len(out, body_len)?;
    let mac = hmac_sha1(key, out);
    StunAttribute::new(ATTR_MESSAGE_INTEGRITY, mac.to_vec()).write_to(out)
}

// FINGERPRINT: length 필드를 FINGERPRINT 끝까지로 맞춘 뒤 CRC32 ^ 0x5354554E
fn append_fingerprint(out: &mut Vec<u8>) -> MuxResult<()> {
    let body_len = out.len() - HEADER_SIZE + FINGERPRINT_ATTR_LEN;
    set_body_len(out, body_len)?;
    let crc = crc32(out) ^ FINGERPRINT_XOR;
    StunAttribute::new(ATTR_FINGERPRINT, crc.to_be_bytes().to_vec()).write_to(out)
}

// ----------------------------------------------------------------------------
// [검증] 수신 원본 바이트 기준
// ----------------------------------------------------------------------------

/// 마지막 attribute가 FINGERPRINT 이고 CRC가 일치하면 true
pub fn verify_fingerprint(buf: &[u8]) -> bool {
    let msg = match StunMessage::decode(buf) {
        Ok(m)  => m,
        Err(_) => return false,
    };
    let expected = match msg.attributes.last() {
        Some(a) if a.attr_type == ATTR_FINGERPRINT && a.value.len() == 4 => {
            u32::from_be_bytes([a.value[0], a.value[1], a.value[2], a.value[3]])
        }
        _ => return false,
    };
    crc32(&buf[..buf.len() - FINGERPRINT_ATTR_LEN]) ^ FINGERPRINT_XOR == expected
}

/// MESSAGE-INTEGRITY 가 있고 key로 계산한 HMAC과 일치하면 true.
/// MESSAGE-INTEGRITY 뒤의 attribute(FINGERPRINT)는 length 계산에서 제외.
pub fn verify_integrity(buf: &[u8], key: &[u8]) -> bool {
    let msg = match StunMessage::decode(buf) {
        Ok(m)  => m,
        Err(_) => return false,
    };

    let mut offset = HEADER_SIZE;
    for attr in &msg.attributes {
        if attr.attr_type == ATTR_MESSAGE_INTEGRITY {
            if attr.value.len() != HMAC_SHA1_LEN {
                return false;
            }
            let mut prefix = buf[..offset].to_vec();
            let adjusted = offset - HEADER_SIZE + INTEGRITY_ATTR_LEN;
            if set_body_len(&mut prefix, adjusted).is_err() {
                return false;
            }
            return hmac_sha1_verify(key, &prefix, &attr.value);
        }
        offset += attr.encoded_len();
    }
    false
}

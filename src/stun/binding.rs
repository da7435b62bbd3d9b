// author: kodeholic (powered by Claude)
// STUN Binding 트랜잭션 (ICE connectivity check 응답)
//
//   Request  : [USERNAME] [MESSAGE-INTEGRITY] FINGERPRINT
//   Success  : XOR-MAPPED-ADDRESS [MESSAGE-INTEGRITY] FINGERPRINT
//   Error    : ERROR-CODE(401) FINGERPRINT : MESSAGE-INTEGRITY 검증 실패 시
//
// RFC 5389 필수 속성: 빠지면 브라우저가 응답을 무시함

use std::net::SocketAddr;

use tracing::trace;

use crate::error::{MuxError, MuxResult};
use crate::stun::attribute::{StunAttribute, StunErrorCode, ATTR_FINGERPRINT, ATTR_USERNAME};
use crate::stun::message::{
    verify_fingerprint, verify_integrity, StunMessage, TransactionId, BINDING_ERROR,
    BINDING_REQUEST, BINDING_SUCCESS,
};

/// Binding Request 생성. password가 있으면 MESSAGE-INTEGRITY 포함
pub fn binding_request(
    txid:     TransactionId,
    username: Option<&str>,
    password: Option<&str>,
) -> MuxResult<Vec<u8>> {
    let mut msg = StunMessage::new(BINDING_REQUEST, txid);
    if let Some(name) = username {
        msg.push(StunAttribute::username(name));
    }
    match password {
        Some(pwd) => msg.encode_with_integrity(pwd.as_bytes()),
        None      => msg.encode(),
    }
}

/// 수신한 Binding Request에 대한 응답 바이트 생성.
/// Request가 아니면 Ok(None), FINGERPRINT 불일치면 Format 에러.
pub fn answer_binding(
    raw:      &[u8],
    src_addr: SocketAddr,
    password: Option<&str>,
) -> MuxResult<Option<Vec<u8>>> {
    let request = StunMessage::decode(raw)?;
    if request.msg_type != BINDING_REQUEST {
        trace!("[stun] ignoring non-request type=0x{:04x} from {}", request.msg_type, src_addr);
        return Ok(None);
    }

    if request.get(ATTR_FINGERPRINT).is_some() && !verify_fingerprint(raw) {
        return Err(MuxError::Format("FINGERPRINT mismatch".into()));
    }

    let txid = request.transaction_id;

    if let Some(pwd) = password {
        if !verify_integrity(raw, pwd.as_bytes()) {
            let user = request.get(ATTR_USERNAME).and_then(|a| a.as_username()).unwrap_or("-");
            trace!("[stun] MESSAGE-INTEGRITY rejected from {} username={}", src_addr, user);
            let error = StunMessage::new(BINDING_ERROR, txid)
                .with_attribute(StunErrorCode::Unauthorized.encode());
            return error.encode().map(Some);
        }
    }

    let response = StunMessage::new(BINDING_SUCCESS, txid)
        .with_attribute(StunAttribute::xor_mapped_address(src_addr, &txid));

    let bytes = match password {
        Some(pwd) => response.encode_with_integrity(pwd.as_bytes())?,
        None      => response.encode()?,
    };
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stun::attribute::{ATTR_ERROR_CODE, ATTR_XOR_MAPPED_ADDRESS};

    fn src() -> SocketAddr {
        "10.0.0.7:54321".parse().unwrap()
    }

    #[test]
    fn success_carries_mapped_address() {
        let txid    = TransactionId::random();
        let request = binding_request(txid, Some("srv:cli"), None).unwrap();
        let resp    = answer_binding(&request, src(), None).unwrap().unwrap();

        let msg = StunMessage::decode(&resp).unwrap();
        assert_eq!(msg.msg_type, BINDING_SUCCESS);
        assert_eq!(msg.transaction_id, txid);
        let mapped = msg.get(ATTR_XOR_MAPPED_ADDRESS).unwrap();
        assert_eq!(mapped.as_xor_mapped_address(&txid).unwrap(), src());
        assert!(verify_fingerprint(&resp));
    }

    #[test]
    fn authenticated_request_gets_signed_response() {
        let txid    = TransactionId::random();
        let request = binding_request(txid, Some("srv:cli"), Some("secret")).unwrap();
        let resp    = answer_binding(&request, src(), Some("secret")).unwrap().unwrap();

        assert_eq!(StunMessage::decode(&resp).unwrap().msg_type, BINDING_SUCCESS);
        assert!(verify_integrity(&resp, b"secret"));
    }

    #[test]
    fn wrong_password_gets_unauthorized() {
        let txid    = TransactionId::random();
        let request = binding_request(txid, Some("srv:cli"), Some("guess")).unwrap();
        let resp    = answer_binding(&request, src(), Some("secret")).unwrap().unwrap();

        let msg = StunMessage::decode(&resp).unwrap();
        assert_eq!(msg.msg_type, BINDING_ERROR);
        let (code, _) = msg.get(ATTR_ERROR_CODE).unwrap().error_code().unwrap();
        assert_eq!(code, 401);
    }

    #[test]
    fn responses_are_not_answered() {
        let txid = TransactionId::random();
        let resp = StunMessage::new(BINDING_SUCCESS, txid).encode().unwrap();
        assert!(answer_binding(&resp, src(), None).unwrap().is_none());
    }

    #[test]
    fn corrupted_fingerprint_rejected() {
        let mut request = binding_request(TransactionId::random(), None, None).unwrap();
        let last = request.len() - 1;
        request[last] ^= 0xff;
        assert!(matches!(answer_binding(&request, src(), None), Err(MuxError::Format(_))));
    }
}

// author: kodeholic (powered by Claude)
// STUN 바이너리 코덱 (RFC 5389)
//
//   message   : 헤더/attribute 인코딩·디코딩, FINGERPRINT / MESSAGE-INTEGRITY
//   attribute : attribute 타입별 헬퍼 (USERNAME, ERROR-CODE, XOR-MAPPED-ADDRESS)
//   binding   : Binding Request 생성 및 응답

pub mod attribute;
pub mod binding;
pub mod message;

pub use attribute::{AttributeKind, StunAttribute, StunErrorCode};
pub use binding::{answer_binding, binding_request};
pub use message::{verify_fingerprint, verify_integrity, MessageClass, StunMessage, TransactionId};

// author: kodeholic (powered by Claude)
// 로컬 DTLS 신원: 라우터 start() 시 1회 생성, 모든 세션 공유
//
// dtls 크레이트가 ECDSA P-256 키 + 자체서명 인증서를 만들며,
// 키 생성 난수는 OS CSPRNG 에서 시드됩니다.

use tracing::info;

use crate::crypto::sha256_fingerprint;
use crate::error::{MuxError, MuxResult};

pub struct ServerCert {
    pub dtls_cert:   dtls::crypto::Certificate,
    /// 리프 인증서 DER
    pub der:         Vec<u8>,
    pub fingerprint: String,
}

impl ServerCert {
    pub fn generate(subject: &str) -> MuxResult<Self> {
        let dtls_cert = dtls::crypto::Certificate::generate_self_signed(vec![subject.to_string()])
            .map_err(|e| MuxError::Certificate(e.to_string()))?;

        let der: Vec<u8> = dtls_cert
            .certificate
            .first()
            .map(|c| c.to_vec())
            .ok_or_else(|| MuxError::Certificate("generated certificate chain is empty".into()))?;

        let fingerprint = sha256_fingerprint(&der);
        info!("[dtls] local cert generated. fingerprint={:.47}...", fingerprint);

        Ok(Self { dtls_cert, der, fingerprint })
    }
}

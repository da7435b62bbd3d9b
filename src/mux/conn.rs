// author: kodeholic (powered by Claude)
// SessionConn: DTLS 엔진용 bring-your-own-I/O 어댑터
//
// 엔진 신호 ↔ 어댑터 호출:
//   produce output → send()  : 공유 UdpTransport 로 전송, 세션 내 직렬화
//   need input     → recv()  : 세션 inbound 큐에서 다음 데이터그램 pop
//   retry/reset    → 엔진 내부 (HelloVerifyRequest 쿠키, flight 재전송)
//
// inbound 큐의 소비자는 엔진의 수신 루프 하나뿐입니다. 꺼낸 데이터그램을
// 큐 앞에 되돌려 넣는 일은 없습니다.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use crate::mux::net::UdpTransport;
use crate::mux::registry::InboundRx;

pub struct SessionConn {
    transport: Arc<UdpTransport>,
    peer_addr: SocketAddr,
    rx:        Mutex<InboundRx>,
    send_lock: Mutex<()>,
}

impl SessionConn {
    pub fn new(transport: Arc<UdpTransport>, peer_addr: SocketAddr, rx: InboundRx) -> Self {
        Self {
            transport,
            peer_addr,
            rx:        Mutex::new(rx),
            send_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl webrtc_util::Conn for SessionConn {
    async fn connect(&self, _addr: SocketAddr) -> webrtc_util::Result<()> { Ok(()) }

    async fn recv(&self, buf: &mut [u8]) -> webrtc_util::Result<usize> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                trace!("[dtls] input {} bytes from {}", len, self.peer_addr);
                Ok(len)
            }
            // registry 에서 제거됨 (close / 핸드셰이크 실패)
            None => Err(webrtc_util::Error::Other("session inbound queue closed".to_string())),
        }
    }

    async fn recv_from(&self, buf: &mut [u8]) -> webrtc_util::Result<(usize, SocketAddr)> {
        let n = self.recv(buf).await?;
        Ok((n, self.peer_addr))
    }

    async fn send(&self, buf: &[u8]) -> webrtc_util::Result<usize> {
        let _guard = self.send_lock.lock().await;
        trace!("[dtls] output {} bytes to {}", buf.len(), self.peer_addr);
        self.transport.write(self.peer_addr, buf).await
            .map_err(|e| webrtc_util::Error::Other(e.to_string()))
    }

    async fn send_to(&self, buf: &[u8], _target: SocketAddr) -> webrtc_util::Result<usize> {
        self.send(buf).await
    }

    fn local_addr(&self) -> webrtc_util::Result<SocketAddr> {
        Ok(self.transport.local_addr())
    }

    fn remote_addr(&self) -> Option<SocketAddr> { Some(self.peer_addr) }

    // 공유 소켓이므로 transport 는 닫지 않음
    async fn close(&self) -> webrtc_util::Result<()> { Ok(()) }

    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) { self }
}

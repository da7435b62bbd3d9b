// author: kodeholic (powered by Claude)
// UDP 전송 계층
//
// 수신 흐름:
//   recv_from(src_addr)  ← 내부 수신 태스크 (소켓당 1개)
//     → UdpPacket { payload, remote_addr }
//     → unbounded 큐 → read()
//
// close() 이후 read()/write() 는 Closed 에러: "아직 데이터 없음"과 구분됩니다.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::UDP_RECV_BUF_SIZE;
use crate::error::{MuxError, MuxResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpPacket {
    pub payload:     Vec<u8>,
    pub remote_addr: SocketAddr,
}

pub struct UdpTransport {
    socket:     Arc<UdpSocket>,
    local_addr: SocketAddr,
    rx:         AsyncMutex<mpsc::UnboundedReceiver<UdpPacket>>,
    recv_task:  Mutex<Option<JoinHandle<()>>>,
    closed:     AtomicBool,
}

impl UdpTransport {
    /// 소켓 바인딩 + 수신 태스크 시작 (tokio 런타임 안에서 호출)
    pub async fn bind(addr: SocketAddr) -> MuxResult<Arc<Self>> {
        let socket     = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;
        let (tx, rx)   = mpsc::unbounded_channel();

        let recv_task = tokio::spawn(run_recv_loop(Arc::clone(&socket), tx));
        info!("[udp] bound on {}", local_addr);

        Ok(Arc::new(Self {
            socket,
            local_addr,
            rx:        AsyncMutex::new(rx),
            recv_task: Mutex::new(Some(recv_task)),
            closed:    AtomicBool::new(false),
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// best-effort 전송
    pub async fn write(&self, remote_addr: SocketAddr, payload: &[u8]) -> MuxResult<usize> {
        if self.is_closed() {
            warn!("[udp] write to {} on closed transport ({} bytes dropped)", remote_addr, payload.len());
            return Err(MuxError::Closed);
        }
        let sent = self.socket.send_to(payload, remote_addr).await?;
        trace!("[udp] {} bytes → {}", sent, remote_addr);
        Ok(sent)
    }

    /// 다음 데이터그램까지 대기
    pub async fn read(&self) -> MuxResult<UdpPacket> {
        if self.is_closed() {
            debug!("[udp] read on closed transport {}", self.local_addr);
            return Err(MuxError::Closed);
        }
        let mut rx = self.rx.lock().await;
        // 수신 태스크가 abort 되면 sender drop → None
        rx.recv().await.ok_or(MuxError::Closed)
    }

    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            warn!("[udp] close called on already closed transport {}", self.local_addr);
            return;
        }
        if let Some(task) = self.recv_task.lock().unwrap().take() {
            task.abort();
        }
        info!("[udp] closed {}", self.local_addr);
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if let Ok(slot) = self.recv_task.get_mut() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

async fn run_recv_loop(socket: Arc<UdpSocket>, tx: mpsc::UnboundedSender<UdpPacket>) {
    let mut buf = vec![0u8; UDP_RECV_BUF_SIZE];

    loop {
        let (len, remote_addr) = match socket.recv_from(&mut buf).await {
            Ok(r)  => r,
            // Windows ICMP port unreachable 등: 소켓은 계속 유효
            Err(e) => { warn!("[udp] recv_from: {}", e); continue; }
        };

        trace!("[udp] {} bytes from {}", len, remote_addr);

        let packet = UdpPacket { payload: buf[..len].to_vec(), remote_addr };
        if tx.send(packet).is_err() {
            debug!("[udp] receiver dropped, recv loop exiting");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn write_then_read_tags_sender() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let b = UdpTransport::bind(loopback()).await.unwrap();

        a.write(b.local_addr(), b"hello").await.unwrap();
        let packet = tokio::time::timeout(Duration::from_secs(2), b.read()).await.unwrap().unwrap();

        assert_eq!(packet.payload, b"hello");
        assert_eq!(packet.remote_addr, a.local_addr());
    }

    #[tokio::test]
    async fn datagrams_arrive_in_order() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let b = UdpTransport::bind(loopback()).await.unwrap();

        for i in 0u8..5 {
            a.write(b.local_addr(), &[i]).await.unwrap();
        }
        for i in 0u8..5 {
            let p = tokio::time::timeout(Duration::from_secs(2), b.read()).await.unwrap().unwrap();
            assert_eq!(p.payload, vec![i]);
        }
    }

    #[tokio::test]
    async fn closed_transport_signals_closed() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        a.close();
        a.close(); // 두 번째 호출은 경고만

        assert!(a.is_closed());
        assert!(matches!(a.read().await, Err(MuxError::Closed)));
        assert!(matches!(a.write(a.local_addr(), b"x").await, Err(MuxError::Closed)));
    }

    #[tokio::test]
    async fn close_wakes_pending_reader() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let reader = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.read().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        a.close();

        let result = tokio::time::timeout(Duration::from_secs(2), reader).await.unwrap().unwrap();
        assert!(matches!(result, Err(MuxError::Closed)));
    }
}

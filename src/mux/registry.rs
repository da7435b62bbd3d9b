// author: kodeholic (powered by Claude)
// SessionRegistry: 원격 주소별 라우팅 테이블
//
//   established : SocketAddr → 세션 inbound 큐 (세션당 1개)
//   pending     : SocketAddr → 대기 데이터그램 1개 (PendingTable)
//
// 두 테이블은 하나의 Mutex 아래에 둡니다. 수신 루프의 route()와
// accept()의 claim()이 서로 다른 워커 스레드에서 돌 수 있으므로
// "pending에서 꺼냄 + established 등록"이 한 번에 일어나야 합니다.
// 잠금은 await 를 넘기지 않습니다.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::error::{MuxError, MuxResult};
use crate::mux::pending::{PendingInsert, PendingTable};

pub type InboundTx = mpsc::UnboundedSender<Vec<u8>>;
pub type InboundRx = mpsc::UnboundedReceiver<Vec<u8>>;

/// route() 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Session,
    Pending(PendingInsert),
}

struct Tables {
    established: HashMap<SocketAddr, InboundTx>,
    pending:     PendingTable,
}

pub struct SessionRegistry {
    tables:        Mutex<Tables>,
    pending_ready: Notify,
}

impl SessionRegistry {
    pub fn new(pending_capacity: usize) -> Self {
        Self {
            tables: Mutex::new(Tables {
                established: HashMap::new(),
                pending:     PendingTable::new(pending_capacity),
            }),
            pending_ready: Notify::new(),
        }
    }

    /// 수신 데이터그램 분배: 확립된 세션이면 inbound 큐로, 아니면 pending
    pub fn route(&self, remote_addr: SocketAddr, datagram: Vec<u8>) -> Routed {
        let mut tables   = self.tables.lock().unwrap();
        let mut datagram = datagram;

        if let Some(tx) = tables.established.get(&remote_addr) {
            match tx.send(datagram) {
                Ok(())      => return Routed::Session,
                Err(failed) => datagram = failed.0,
            }
            // 세션 쪽 receiver 가 drop 됨: 주소 해제 후 새 피어로 취급
            tables.established.remove(&remote_addr);
            debug!("[registry] stale session removed addr={}", remote_addr);
        }

        let result = tables.pending.insert(remote_addr, datagram);
        drop(tables);

        self.pending_ready.notify_one();
        Routed::Pending(result)
    }

    /// 가장 오래된 pending 엔트리를 꺼내 세션으로 등록.
    /// 새 inbound 큐에는 꺼낸 데이터그램이 먼저 들어가 있음.
    pub fn claim(&self) -> Option<(SocketAddr, InboundRx)> {
        let mut tables = self.tables.lock().unwrap();
        let entry      = tables.pending.take_oldest()?;
        let (tx, rx)   = mpsc::unbounded_channel();

        // rx 를 들고 있으므로 실패하지 않음
        let _ = tx.send(entry.datagram);
        tables.established.insert(entry.remote_addr, tx);

        debug!("[registry] pending claimed addr={}", entry.remote_addr);
        Some((entry.remote_addr, rx))
    }

    /// 능동(client) 세션 등록. 살아있는 세션이 이미 있으면 거절
    pub fn register(&self, remote_addr: SocketAddr) -> MuxResult<InboundRx> {
        let mut tables = self.tables.lock().unwrap();

        if let Some(tx) = tables.established.get(&remote_addr) {
            if !tx.is_closed() {
                return Err(MuxError::AlreadyEstablished(remote_addr));
            }
        }
        if tables.pending.remove(&remote_addr).is_some() {
            debug!("[registry] dropped pending datagram on dial addr={}", remote_addr);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tables.established.insert(remote_addr, tx);
        debug!("[registry] session registered addr={}", remote_addr);
        Ok(rx)
    }

    pub fn remove(&self, remote_addr: &SocketAddr) -> bool {
        let removed = self.tables.lock().unwrap().established.remove(remote_addr).is_some();
        if removed {
            debug!("[registry] session removed addr={}", remote_addr);
        }
        removed
    }

    pub fn is_established(&self, remote_addr: &SocketAddr) -> bool {
        self.tables.lock().unwrap().established.contains_key(remote_addr)
    }

    pub fn established_count(&self) -> usize {
        self.tables.lock().unwrap().established.len()
    }

    pub fn pending_count(&self) -> usize {
        self.tables.lock().unwrap().pending.len()
    }

    pub fn pending_datagram(&self, remote_addr: &SocketAddr) -> Option<Vec<u8>> {
        self.tables.lock().unwrap().pending.get(remote_addr).map(<[u8]>::to_vec)
    }

    /// route() 가 pending 에 뭔가 넣을 때까지 대기 (spurious wake 가능)
    pub async fn wait_pending(&self) {
        self.pending_ready.notified().await;
    }

    /// stop() 시 대기 중인 accept() 깨우기
    pub fn wake_all(&self) {
        self.pending_ready.notify_waiters();
        self.pending_ready.notify_one();
    }
}

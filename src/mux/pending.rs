// author: kodeholic (powered by Claude)
// 미확립 주소의 대기 테이블
//
// 규칙:
//   - 주소당 데이터그램 최대 1개. 같은 주소에서 또 오면 덮어씀 (위치 유지)
//   - 용량 초과 상태에서 새 주소가 오면 가장 오래된 엔트리를 밀어냄
//   - accept()는 도착 순서(FIFO)대로 꺼냄

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub remote_addr: SocketAddr,
    pub datagram:    Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInsert {
    New,
    Replaced,
    /// 용량 초과로 밀려난 주소
    Evicted(SocketAddr),
}

pub struct PendingTable {
    capacity: usize,
    order:    VecDeque<SocketAddr>,
    entries:  HashMap<SocketAddr, Vec<u8>>,
}

impl PendingTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order:    VecDeque::new(),
            entries:  HashMap::new(),
        }
    }

    pub fn insert(&mut self, remote_addr: SocketAddr, datagram: Vec<u8>) -> PendingInsert {
        if let Some(slot) = self.entries.get_mut(&remote_addr) {
            *slot = datagram;
            return PendingInsert::Replaced;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                evicted = Some(oldest);
            }
        }

        self.order.push_back(remote_addr);
        self.entries.insert(remote_addr, datagram);

        match evicted {
            Some(addr) => PendingInsert::Evicted(addr),
            None       => PendingInsert::New,
        }
    }

    /// 가장 먼저 도착한 주소의 엔트리를 꺼냄
    pub fn take_oldest(&mut self) -> Option<PendingEntry> {
        while let Some(remote_addr) = self.order.pop_front() {
            if let Some(datagram) = self.entries.remove(&remote_addr) {
                return Some(PendingEntry { remote_addr, datagram });
            }
        }
        None
    }

    pub fn remove(&mut self, remote_addr: &SocketAddr) -> Option<Vec<u8>> {
        let datagram = self.entries.remove(remote_addr)?;
        self.order.retain(|a| a != remote_addr);
        Some(datagram)
    }

    pub fn get(&self, remote_addr: &SocketAddr) -> Option<&[u8]> {
        self.entries.get(remote_addr).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    #[test]
    fn second_datagram_replaces_first() {
        let mut table = PendingTable::new(4);
        assert_eq!(table.insert(addr(5000), vec![1]), PendingInsert::New);
        assert_eq!(table.insert(addr(5000), vec![2]), PendingInsert::Replaced);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&addr(5000)), Some(&[2u8][..]));
    }

    #[test]
    fn take_oldest_is_fifo() {
        let mut table = PendingTable::new(4);
        table.insert(addr(1), vec![1]);
        table.insert(addr(2), vec![2]);
        table.insert(addr(1), vec![11]); // 덮어써도 순서 유지

        let first = table.take_oldest().unwrap();
        assert_eq!(first, PendingEntry { remote_addr: addr(1), datagram: vec![11] });
        assert_eq!(table.take_oldest().unwrap().remote_addr, addr(2));
        assert!(table.take_oldest().is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn full_table_evicts_oldest() {
        let mut table = PendingTable::new(2);
        table.insert(addr(1), vec![1]);
        table.insert(addr(2), vec![2]);
        assert_eq!(table.insert(addr(3), vec![3]), PendingInsert::Evicted(addr(1)));
        assert_eq!(table.len(), 2);
        assert!(table.get(&addr(1)).is_none());

        // 기존 주소 덮어쓰기는 evict 없음
        assert_eq!(table.insert(addr(2), vec![22]), PendingInsert::Replaced);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn remove_keeps_order_consistent() {
        let mut table = PendingTable::new(4);
        table.insert(addr(1), vec![1]);
        table.insert(addr(2), vec![2]);
        assert_eq!(table.remove(&addr(1)), Some(vec![1]));
        assert_eq!(table.remove(&addr(1)), None);
        assert_eq!(table.take_oldest().unwrap().remote_addr, addr(2));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut table = PendingTable::new(0);
        table.insert(addr(1), vec![1]);
        assert_eq!(table.insert(addr(2), vec![2]), PendingInsert::Evicted(addr(1)));
        assert_eq!(table.len(), 1);
    }
}

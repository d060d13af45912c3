//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv6 邻居缓存
//!
//! 缓存 IPv6 地址到 (接口, 链路地址) 的映射

use alloc::vec::Vec;

use super::Ipv6Addr;
use crate::net::llhdr::LinkAddr;

/// 邻居缓存条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NcEntry {
    /// IPv6 地址
    pub addr: Ipv6Addr,
    /// 接口编号
    pub iface: u16,
    /// 链路地址
    pub ll_addr: LinkAddr,
}

/// 邻居缓存
///
/// 简化实现：固定大小，满了以后替换最旧的条目
pub struct NeighborCache {
    entries: Vec<NcEntry>,
    capacity: usize,
}

impl NeighborCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// 查找邻居
    pub fn lookup(&self, addr: &Ipv6Addr) -> Option<NcEntry> {
        self.entries.iter().find(|e| e.addr == *addr).copied()
    }

    /// 添加或更新邻居
    pub fn update(&mut self, addr: Ipv6Addr, iface: u16, ll_addr: LinkAddr) {
        let entry = NcEntry { addr, iface, ll_addr };
        if let Some(existing) = self.entries.iter_mut().find(|e| e.addr == addr) {
            *existing = entry;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    /// 删除邻居
    pub fn remove(&mut self, addr: &Ipv6Addr) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.addr != *addr);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

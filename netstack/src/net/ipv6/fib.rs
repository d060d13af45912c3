//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! IPv6 转发表
//!
//! 最长前缀匹配，条目没有网关时目的地址本身就是下一跳（链路直连）

use alloc::vec::Vec;

use super::Ipv6Addr;
use crate::net::error::{NetError, NetResult};

/// 转发表条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibEntry {
    /// 目的前缀
    pub prefix: Ipv6Addr,
    /// 前缀长度 (0..=128)
    pub prefix_len: u8,
    /// 网关，`None` 表示链路直连
    pub next_hop: Option<Ipv6Addr>,
    /// 输出接口编号
    pub iface: u16,
}

impl FibEntry {
    /// 创建新的转发表条目
    pub fn new(prefix: Ipv6Addr, prefix_len: u8, next_hop: Option<Ipv6Addr>, iface: u16) -> Self {
        Self {
            prefix,
            prefix_len: prefix_len.min(128),
            next_hop,
            iface,
        }
    }

    /// 默认路由 ::/0
    pub fn default_route(next_hop: Ipv6Addr, iface: u16) -> Self {
        Self::new(Ipv6Addr::UNSPECIFIED, 0, Some(next_hop), iface)
    }

    /// 检查地址是否匹配此条目
    pub fn matches(&self, addr: &Ipv6Addr) -> bool {
        addr.prefix_matches(&self.prefix, self.prefix_len)
    }
}

/// 转发表
pub struct Fib {
    entries: Vec<FibEntry>,
    capacity: usize,
}

impl Fib {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// 添加条目，相同前缀的条目会被替换
    pub fn add(&mut self, entry: FibEntry) -> NetResult<()> {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.prefix_len == entry.prefix_len && e.matches(&entry.prefix))
        {
            *existing = entry;
            return Ok(());
        }
        if self.entries.len() >= self.capacity {
            return Err(NetError::TableFull);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// 删除条目
    pub fn remove(&mut self, prefix: &Ipv6Addr, prefix_len: u8) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.prefix_len == prefix_len && e.matches(prefix)));
        self.entries.len() != before
    }

    /// 最长前缀匹配
    pub fn lookup(&self, dst: &Ipv6Addr) -> Option<FibEntry> {
        self.entries
            .iter()
            .filter(|e| e.matches(dst))
            .max_by_key(|e| e.prefix_len)
            .copied()
    }

    /// 查找下一跳
    ///
    /// # 返回
    /// (下一跳地址, 输出接口)
    pub fn next_hop(&self, dst: &Ipv6Addr) -> Option<(Ipv6Addr, u16)> {
        self.lookup(dst)
            .map(|e| (e.next_hop.unwrap_or(*dst), e.iface))
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

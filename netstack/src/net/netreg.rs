//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 协议注册表
//!
//! 记录哪些任务对 (网络类型, 分用键) 感兴趣。分用键对 UDP 是端口号，
//! 对 ICMPv6 是消息类型，对链路层是接口编号。
//!
//! 协议层自身用 `DEMUX_ANY` 注册，表示接收该类型的所有流量。
//! 用 `DEMUX_ANY` 查找会匹配该类型下任意键的条目；协议层之间转交数据包时
//! 用 `lookup_exact` 只找用 `DEMUX_ANY` 注册的任务。条目按注册顺序返回

use alloc::vec::{self, Vec};

use log::debug;
use spin::Mutex;

use crate::net::error::{NetError, NetResult};
use crate::net::nettype::NetType;
use crate::sched::TaskId;

/// 分用键
pub type DemuxKey = u32;

/// 通配分用键
pub const DEMUX_ANY: DemuxKey = 0;

/// 注册表条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetRegEntry {
    pub nettype: NetType,
    pub demux: DemuxKey,
    pub pid: TaskId,
}

impl NetRegEntry {
    /// `DEMUX_ANY` 匹配任意键
    fn matches(&self, nettype: NetType, demux: DemuxKey) -> bool {
        self.nettype == nettype && (demux == DEMUX_ANY || self.demux == demux)
    }
}

/// 查找结果，可以传给 `lookup_next` 继续查找
///
/// 查找过程中有条目被删除时，后续结果可能跳过或重复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetRegMatch {
    entry: NetRegEntry,
    demux: DemuxKey,
    pos: usize,
}

impl NetRegMatch {
    pub fn pid(&self) -> TaskId {
        self.entry.pid
    }

    pub fn entry(&self) -> NetRegEntry {
        self.entry
    }
}

/// 注册表
pub struct NetReg {
    entries: Mutex<Vec<NetRegEntry>>,
    capacity: usize,
}

impl NetReg {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// 注册
    ///
    /// # 返回
    /// 相同条目已存在返回 `DuplicateRegistration`，表满返回 `TableFull`
    pub fn register(&self, nettype: NetType, demux: DemuxKey, pid: TaskId) -> NetResult<()> {
        let entry = NetRegEntry { nettype, demux, pid };
        let mut entries = self.entries.lock();
        if entries.contains(&entry) {
            return Err(NetError::DuplicateRegistration);
        }
        if entries.len() >= self.capacity {
            return Err(NetError::TableFull);
        }
        entries.push(entry);
        debug!("netreg: {} registered for ({}, {})", pid, nettype, demux);
        Ok(())
    }

    /// 注销
    pub fn unregister(&self, nettype: NetType, demux: DemuxKey, pid: TaskId) -> NetResult<()> {
        let entry = NetRegEntry { nettype, demux, pid };
        let mut entries = self.entries.lock();
        let pos = entries
            .iter()
            .position(|e| *e == entry)
            .ok_or(NetError::NotRegistered)?;
        entries.remove(pos);
        debug!("netreg: {} unregistered from ({}, {})", pid, nettype, demux);
        Ok(())
    }

    /// 注销任务的所有条目
    ///
    /// # 返回
    /// 删除的条目数
    pub fn unregister_task(&self, pid: TaskId) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.pid != pid);
        before - entries.len()
    }

    fn find_from(&self, nettype: NetType, demux: DemuxKey, start: usize) -> Option<NetRegMatch> {
        let entries = self.entries.lock();
        entries
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, e)| e.matches(nettype, demux))
            .map(|(pos, e)| NetRegMatch {
                entry: *e,
                demux,
                pos,
            })
    }

    /// 查找第一个匹配的条目
    ///
    /// `demux` 为 `DEMUX_ANY` 时匹配该类型的所有条目
    pub fn lookup_first(&self, nettype: NetType, demux: DemuxKey) -> Option<NetRegMatch> {
        self.find_from(nettype, demux, 0)
    }

    /// 查找下一个匹配的条目
    pub fn lookup_next(&self, prev: &NetRegMatch) -> Option<NetRegMatch> {
        self.find_from(prev.entry.nettype, prev.demux, prev.pos + 1)
    }

    fn snapshot(&self, pred: impl Fn(&NetRegEntry) -> bool) -> vec::IntoIter<TaskId> {
        let entries = self.entries.lock();
        entries
            .iter()
            .filter(|e| pred(e))
            .map(|e| e.pid)
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// 所有匹配任务的快照，`DEMUX_ANY` 匹配任意键
    pub fn lookup(&self, nettype: NetType, demux: DemuxKey) -> vec::IntoIter<TaskId> {
        self.snapshot(|e| e.matches(nettype, demux))
    }

    /// 按键精确匹配的快照
    ///
    /// 协议层之间转交数据包时使用，`DEMUX_ANY` 只找到用 `DEMUX_ANY` 注册的任务
    pub fn lookup_exact(&self, nettype: NetType, demux: DemuxKey) -> vec::IntoIter<TaskId> {
        self.snapshot(|e| e.nettype == nettype && e.demux == demux)
    }

    /// 匹配的条目数，`DEMUX_ANY` 匹配任意键
    pub fn num_of(&self, nettype: NetType, demux: DemuxKey) -> usize {
        let entries = self.entries.lock();
        entries.iter().filter(|e| e.matches(nettype, demux)).count()
    }

    /// 全部条目，按注册顺序
    pub fn entries(&self) -> Vec<NetRegEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u16) -> TaskId {
        TaskId::new(n)
    }

    #[test]
    fn test_lookup_in_registration_order() {
        let reg = NetReg::new(8);
        reg.register(NetType::Udp, 53, pid(3)).unwrap();
        reg.register(NetType::Udp, 53, pid(1)).unwrap();
        reg.register(NetType::Udp, 80, pid(2)).unwrap();

        let first = reg.lookup_first(NetType::Udp, 53).unwrap();
        assert_eq!(first.pid(), pid(3));
        let second = reg.lookup_next(&first).unwrap();
        assert_eq!(second.pid(), pid(1));
        assert!(reg.lookup_next(&second).is_none());

        assert_eq!(reg.num_of(NetType::Udp, 53), 2);
        assert_eq!(reg.lookup(NetType::Udp, 80).collect::<Vec<_>>(), [pid(2)]);
    }

    #[test]
    fn test_any_matches_every_key() {
        let reg = NetReg::new(8);
        reg.register(NetType::Udp, DEMUX_ANY, pid(1)).unwrap();
        reg.register(NetType::Udp, 53, pid(2)).unwrap();
        reg.register(NetType::Icmpv6, 128, pid(3)).unwrap();
        reg.register(NetType::Udp, 5683, pid(4)).unwrap();

        assert_eq!(
            reg.lookup(NetType::Udp, DEMUX_ANY).collect::<Vec<_>>(),
            [pid(1), pid(2), pid(4)]
        );
        assert_eq!(reg.num_of(NetType::Udp, DEMUX_ANY), 3);
        assert_eq!(reg.lookup(NetType::Udp, 53).collect::<Vec<_>>(), [pid(2)]);
        assert_eq!(reg.num_of(NetType::Ipv6, DEMUX_ANY), 0);

        let first = reg.lookup_first(NetType::Udp, DEMUX_ANY).unwrap();
        let second = reg.lookup_next(&first).unwrap();
        assert_eq!(second.entry().demux, 53);
        let third = reg.lookup_next(&second).unwrap();
        assert_eq!(third.pid(), pid(4));
        assert!(reg.lookup_next(&third).is_none());
    }

    #[test]
    fn test_lookup_exact() {
        let reg = NetReg::new(8);
        reg.register(NetType::Udp, DEMUX_ANY, pid(1)).unwrap();
        reg.register(NetType::Udp, 53, pid(2)).unwrap();
        assert_eq!(reg.lookup_exact(NetType::Udp, DEMUX_ANY).collect::<Vec<_>>(), [pid(1)]);
        assert_eq!(reg.lookup_exact(NetType::Udp, 53).collect::<Vec<_>>(), [pid(2)]);
        assert_eq!(reg.lookup_exact(NetType::Udp, 80).count(), 0);
    }

    #[test]
    fn test_duplicate_and_full() {
        let reg = NetReg::new(2);
        reg.register(NetType::Udp, 1, pid(1)).unwrap();
        assert_eq!(
            reg.register(NetType::Udp, 1, pid(1)),
            Err(NetError::DuplicateRegistration)
        );
        reg.register(NetType::Udp, 2, pid(1)).unwrap();
        assert_eq!(reg.register(NetType::Udp, 3, pid(1)), Err(NetError::TableFull));
    }

    #[test]
    fn test_unregister_and_reregister() {
        let reg = NetReg::new(4);
        reg.register(NetType::Udp, 53, pid(1)).unwrap();
        reg.register(NetType::Udp, 53, pid(2)).unwrap();
        reg.unregister(NetType::Udp, 53, pid(1)).unwrap();
        assert_eq!(
            reg.unregister(NetType::Udp, 53, pid(1)),
            Err(NetError::NotRegistered)
        );
        // 重新注册后排在后面
        reg.register(NetType::Udp, 53, pid(1)).unwrap();
        assert_eq!(
            reg.lookup(NetType::Udp, 53).collect::<Vec<_>>(),
            [pid(2), pid(1)]
        );
    }

    #[test]
    fn test_unregister_task() {
        let reg = NetReg::new(4);
        reg.register(NetType::Udp, 53, pid(1)).unwrap();
        reg.register(NetType::Icmpv6, 128, pid(1)).unwrap();
        reg.register(NetType::Udp, 53, pid(2)).unwrap();
        assert_eq!(reg.unregister_task(pid(1)), 2);
        assert_eq!(reg.entries().len(), 1);
    }
}

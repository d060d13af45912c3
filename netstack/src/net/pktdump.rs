//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 数据包打印任务
//!
//! 注册到任意 (类型, 分用键) 上，把收到的每个数据包逐片段打印出来后释放。
//! 启用 `debug_log` 特性时同时打印片段内容

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::info;

use crate::net::error::{NetError, NetResult};
use crate::net::netapi::{Message, MsgKind};
use crate::net::netreg::DemuxKey;
use crate::net::nettype::NetType;
use crate::net::pktbuf::{PktBuf, SnipId};
use crate::net::NetStack;
use crate::sched::{ProtocolTask, TaskId};

/// 片段的打印信息，在缓冲区锁外打印
struct SnipInfo {
    nettype: NetType,
    size: usize,
    #[cfg(feature = "debug_log")]
    data: Vec<u8>,
}

/// 打印一个数据包
///
/// # 返回
/// 数据包总长度
pub fn dump(pktbuf: &PktBuf, kind: MsgKind, pkt: SnipId) -> NetResult<usize> {
    let snips: Vec<SnipInfo> = pktbuf.with_chain(pkt, |views| {
        views
            .iter()
            .map(|view| SnipInfo {
                nettype: view.nettype,
                size: view.data.len(),
                #[cfg(feature = "debug_log")]
                data: view.data.to_vec(),
            })
            .collect()
    })?;

    let mut total = 0;
    for (i, snip) in snips.iter().enumerate() {
        info!(
            "pktdump: {} ~~ snip {:2} - size: {:4} byte, type: {}",
            kind.name(),
            i,
            snip.size,
            snip.nettype
        );
        #[cfg(feature = "debug_log")]
        for (row, chunk) in snip.data.chunks(16).enumerate() {
            info!("pktdump: {:04x}  {:02x?}", row * 16, chunk);
        }
        total += snip.size;
    }
    info!("pktdump: {} ~~ packet total size: {} byte", kind.name(), total);
    Ok(total)
}

/// 打印任务
#[derive(Debug, Default, Clone, Copy)]
pub struct PktDump;

impl ProtocolTask for PktDump {
    fn name(&self) -> &'static str {
        "pktdump"
    }

    fn dispatch(&mut self, stack: &NetStack, msg: Message) {
        let kind = msg.kind();
        match msg {
            Message::Receive(pkt) | Message::Send(pkt) => {
                if let Err(err) = dump(&stack.pktbuf, kind, pkt) {
                    info!("pktdump: {}: {}", pkt, err);
                }
                stack.pktbuf.discard(pkt);
            }
            Message::Get(req) | Message::Set(req) => req.reply(Err(NetError::NotSupported)),
        }
    }
}

/// 创建打印任务并注册到 (nettype, demux)
pub fn init(stack: &NetStack, nettype: NetType, demux: DemuxKey) -> NetResult<TaskId> {
    let pid = stack.sched.spawn(Box::new(PktDump))?;
    stack.netreg.register(nettype, demux, pid)?;
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::netapi;
    use crate::net::testutil::test_stack;

    #[test]
    fn test_dump_total() {
        let stack = test_stack();
        let payload = stack.pktbuf.alloc(10, NetType::Undef).unwrap();
        let pkt = stack.pktbuf.add(Some(payload), None, 8, NetType::Udp).unwrap();
        assert_eq!(dump(&stack.pktbuf, MsgKind::Receive, pkt), Ok(18));
        stack.pktbuf.release(pkt).unwrap();
    }

    #[test]
    fn test_dump_leaves_chain_untouched() {
        let stack = test_stack();
        let pktbuf = &stack.pktbuf;
        let tail = pktbuf.add(None, Some(&[1, 2, 3]), 3, NetType::Undef).unwrap();
        let udp = pktbuf.add(Some(tail), None, 8, NetType::Udp).unwrap();
        let ip = pktbuf.add(Some(udp), None, 40, NetType::Ipv6).unwrap();
        let free = pktbuf.free_bytes();

        assert_eq!(dump(pktbuf, MsgKind::Send, ip), Ok(51));
        assert_eq!(pktbuf.chain_len(ip), Ok(3));
        assert_eq!(pktbuf.users(ip), Ok(1));
        assert_eq!(pktbuf.free_bytes(), free);
        pktbuf.release(ip).unwrap();
        assert!(pktbuf.is_empty());
    }

    #[test]
    fn test_task_releases_packets() {
        let stack = test_stack();
        let pid = init(&stack, NetType::Udp, 5683).unwrap();
        let pkt = stack.pktbuf.alloc(4, NetType::Udp).unwrap();
        assert_eq!(
            netapi::dispatch(&stack, NetType::Udp, 5683, Message::Receive, pkt),
            Ok(1)
        );
        stack.run();
        assert_eq!(stack.sched.handled(pid), 1);
        assert!(stack.pktbuf.is_empty());
        assert_eq!(
            netapi::get(&stack, pid, crate::net::netconf::NetOpt::Proto).unwrap_err(),
            NetError::NotSupported
        );
    }
}

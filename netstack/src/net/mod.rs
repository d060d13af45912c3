//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 网络子系统
//!
//! 消息驱动的 IPv6/UDP 协议栈。每个协议层是一个独立任务，
//! 层与层之间只通过 netapi 消息和共享的数据包缓冲区交换数据：
//!
//! ```text
//!   应用任务 <-> udp <-> ipv6 (+icmpv6) <-> link <-> LinkDevice
//!                  \        |
//!                   +-- netreg (谁订阅了哪种流量)
//! ```

pub mod error;
pub mod ipv6;
pub mod link;
pub mod llhdr;
pub mod netapi;
pub mod netconf;
pub mod netreg;
pub mod nettype;
pub mod pktbuf;
pub mod pktdump;
pub mod udp;

#[cfg(test)]
pub(crate) mod testutil;


pub use error::{NetError, NetResult};
pub use netapi::{Message, MsgKind, OptBuf, OptRequest};
pub use netconf::{Enable, NetOpt, NetState};
pub use netreg::{DemuxKey, NetReg, DEMUX_ANY};
pub use nettype::NetType;
pub use pktbuf::{PktBuf, SnipId};

use log::{debug, info, warn};

use crate::config;
use crate::net::udp::ChecksumSelector;
use crate::sched::{Scheduler, TaskId};

/// 协议栈运行时配置
///
/// 默认值来自 Netstack.toml 生成的编译期常量
#[derive(Debug, Clone, Copy)]
pub struct StackConfig {
    /// 字节池大小（字节）
    pub pktbuf_size: usize,
    /// 最大片段数
    pub pktbuf_max_snips: usize,
    /// 注册表最大条目数
    pub netreg_size: usize,
    /// 最大任务数
    pub max_tasks: usize,
    /// 每个任务的消息队列长度
    pub mailbox_size: usize,
    /// IPv6 转发表大小
    pub fib_size: usize,
    /// IPv6 邻居缓存大小
    pub nc_size: usize,
    /// 默认跳数限制
    pub hop_limit: u8,
    /// IPv6 链路 MTU
    pub ipv6_mtu: u16,
    /// UDP 校验和选择，接收时校验和发送时计算都用它
    pub udp_checksum: ChecksumSelector,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            pktbuf_size: config::PKTBUF_SIZE,
            pktbuf_max_snips: config::PKTBUF_MAX_SNIPS,
            netreg_size: config::NETREG_SIZE,
            max_tasks: config::SCHED_MAX_TASKS,
            mailbox_size: config::SCHED_MAILBOX_SIZE,
            fib_size: config::IPV6_FIB_SIZE,
            nc_size: config::IPV6_NC_SIZE,
            hop_limit: config::IPV6_DEFAULT_HOP_LIMIT,
            ipv6_mtu: config::IPV6_MTU,
            udp_checksum: udp::checksum_for,
        }
    }
}

/// 协议栈上下文
///
/// 所有协议任务共享的三样东西：数据包缓冲区、注册表、调度器
pub struct NetStack {
    pub pktbuf: PktBuf,
    pub netreg: NetReg,
    pub sched: Scheduler,
    config: StackConfig,
}

impl NetStack {
    /// 创建协议栈
    pub fn new(config: StackConfig) -> Self {
        info!(
            "net: {} {}: pktbuf {} bytes / {} snips, {} tasks",
            crate::config::STACK_NAME,
            crate::config::STACK_VERSION,
            config.pktbuf_size,
            config.pktbuf_max_snips,
            config.max_tasks
        );
        Self {
            pktbuf: PktBuf::new(config.pktbuf_size, config.pktbuf_max_snips),
            netreg: NetReg::new(config.netreg_size),
            sched: Scheduler::new(config.max_tasks, config.mailbox_size),
            config,
        }
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// 分发一条消息
    pub fn run_once(&self) -> bool {
        self.sched.run_once(self)
    }

    /// 分发消息直到所有队列为空
    ///
    /// # 返回
    /// 分发的消息数
    pub fn run(&self) -> usize {
        self.sched.run(self)
    }

    /// 分发消息直到条件成立或没有可分发的消息
    pub fn run_until(&self, cond: impl Fn() -> bool) -> bool {
        self.sched.run_until(self, cond)
    }

    /// 停止任务
    ///
    /// # 说明
    /// 队列中尚未处理的数据包被释放，未应答的 get/set 收到 `NoReply`，
    /// 任务的注册表条目全部删除
    pub fn shutdown_task(&self, pid: TaskId) -> NetResult<()> {
        let pending = self.sched.terminate(pid).ok_or(NetError::NoSuchTask)?;
        let dropped = pending.len();
        for msg in pending {
            if let Some(pkt) = msg.snip() {
                if let Err(err) = self.pktbuf.release(pkt) {
                    warn!("net: shutdown of {}: release of {} failed: {}", pid, pkt, err);
                }
            }
        }
        let entries = self.netreg.unregister_task(pid);
        debug!(
            "net: {} shut down, {} pending messages dropped, {} registrations removed",
            pid, dropped, entries
        );
        Ok(())
    }
}

impl Default for NetStack {
    fn default() -> Self {
        Self::new(StackConfig::default())
    }
}
